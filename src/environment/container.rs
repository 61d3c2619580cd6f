//! Container Descriptions
//!
//! Jobs run inside container images addressed by an opaque reference. The
//! generator never pulls or inspects images; it only records the reference
//! and the environment variables the executor must set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Container runtime understood by the workflow executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Docker,
    Singularity,
    Shifter,
}

/// Environment variables attached to a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerProfiles {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// A named container image that transformations can reference.
///
/// ```yaml
/// name: smili
/// type: docker
/// image: docker://pegasus/reproducibility-eht:smili
/// image.site: local
/// profiles:
///   env:
///     PATH: /usr/local/bin:/usr/bin:/bin
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ContainerKind,

    /// Opaque image reference, e.g. `docker://org/repo:tag`
    pub image: String,

    /// Site the image is fetched from
    #[serde(rename = "image.site", default = "default_image_site")]
    pub image_site: String,

    #[serde(default, skip_serializing_if = "is_default_profiles")]
    pub profiles: ContainerProfiles,
}

fn default_image_site() -> String {
    "local".to_string()
}

fn is_default_profiles(profiles: &ContainerProfiles) -> bool {
    profiles.env.is_empty()
}

impl Container {
    /// Creates a docker container fetched from the local site.
    pub fn docker(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ContainerKind::Docker,
            image: image.into(),
            image_site: default_image_site(),
            profiles: ContainerProfiles::default(),
        }
    }

    /// Adds an environment variable set inside the container.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.profiles.env.insert(key.into(), value.into());
        self
    }
}
