//! Execution Sites
//!
//! Sites are where jobs run (`condorpool`) and where files live (`local`).
//! Like containers, they are plumbed through to the executor unchanged.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86_64,
    Aarch64,
    Ppc64le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    Linux,
    Macosx,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DirectoryKind {
    SharedScratch,
    SharedStorage,
    LocalScratch,
    LocalStorage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    All,
    Get,
    Put,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileServer {
    pub url: String,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    #[serde(rename = "type")]
    pub kind: DirectoryKind,
    pub path: String,
    #[serde(default)]
    pub shared_file_system: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_servers: Vec<FileServer>,
}

impl Directory {
    /// A directory served to every operation through a `file://` URL.
    pub fn served(kind: DirectoryKind, path: &Path) -> Self {
        let path = path.display().to_string();
        Self {
            kind,
            file_servers: vec![FileServer {
                url: format!("file://{}", path),
                operation: Operation::All,
            }],
            path,
            shared_file_system: false,
        }
    }

    /// Makes a relative path (and relative `file://` server URLs) absolute under `base`.
    pub fn rebase(&mut self, base: &Path) {
        if Path::new(&self.path).is_relative() {
            self.path = base.join(&self.path).display().to_string();
        }

        for server in &mut self.file_servers {
            let Some(rest) = server.url.strip_prefix("file://") else {
                continue;
            };
            if Path::new(rest).is_relative() {
                server.url = format!("file://{}", base.join(rest).display());
            }
        }
    }
}

/// Profile namespaces attached to a site (`pegasus`, `condor`, `env`, ...).
pub type Profiles = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<Arch>,

    #[serde(rename = "os.type", default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<OsType>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<Directory>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: Profiles,
}

impl Site {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arch: None,
            os_type: None,
            directories: Vec::new(),
            profiles: Profiles::new(),
        }
    }

    pub fn with_platform(mut self, arch: Arch, os_type: OsType) -> Self {
        self.arch = Some(arch);
        self.os_type = Some(os_type);
        self
    }

    pub fn with_directory(mut self, directory: Directory) -> Self {
        self.directories.push(directory);
        self
    }

    pub fn with_profile(
        mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.profiles
            .entry(namespace.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }
}
