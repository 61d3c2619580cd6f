//! FileSet Resolver
//!
//! Scans an input directory for raw files matching a naming convention and
//! extracts per-file parameters from the file name:
//! - `name`: the file name
//! - `stem`: the file name without its last extension
//! - one entry per named capture group of the extraction pattern

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::artifact::ArtifactName;
use super::wildcards::Params;
use crate::error::{GraphError, Result};

/// Expected type of a captured file-name token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// Any text
    Text,
    /// Decimal integer (leading zeros are kept in the bound value)
    Integer,
}

impl Default for CaptureKind {
    fn default() -> Self {
        Self::Text
    }
}

/// Describes which files in a directory are raw inputs.
///
/// ```yaml
/// glob: "*_[0-9][0-9][0-9]_*.uvfits"
/// pattern: ".*_(?P<epoch>[0-9]{3})_.*"
/// captures:
///   epoch: integer
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSetSpec {
    /// Glob matched against file names (not paths)
    pub glob: String,

    /// Optional regex with named groups applied to each globbed file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Type constraints for named capture groups
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub captures: BTreeMap<String, CaptureKind>,
}

impl FileSetSpec {
    pub fn new(glob: impl Into<String>) -> Self {
        Self {
            glob: glob.into(),
            pattern: None,
            captures: BTreeMap::new(),
        }
    }

    /// Sets the extraction pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Declares the type of a named capture group.
    pub fn with_capture(mut self, name: impl Into<String>, kind: CaptureKind) -> Self {
        self.captures.insert(name.into(), kind);
        self
    }
}

/// A raw input file together with the parameters extracted from its name.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFile {
    pub name: ArtifactName,
    pub path: PathBuf,
    pub params: Params,
}

impl RawFile {
    /// Describes a fixed auxiliary file (mask, colormap, helper script).
    ///
    /// Auxiliary files are referenced by path and are not required to exist
    /// at generation time; a warning is logged when they are missing.
    pub fn auxiliary(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = ArtifactName::from_path(&path).map_err(GraphError::InvalidInput)?;

        if !path.exists() {
            warn!("Auxiliary file not found: {}", path.display());
        }

        let mut params = Params::new();
        params.insert("name".to_string(), name.to_string());
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name.as_str());
        params.insert("stem".to_string(), stem.to_string());

        Ok(Self { name, path, params })
    }

    /// The file stem, used as the instance key for per-file stages.
    pub fn stem(&self) -> &str {
        self.params
            .get("stem")
            .map(String::as_str)
            .unwrap_or(self.name.as_str())
    }
}

/// All raw artifacts available to a build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    /// Discovered input files; per-file stages expand over these
    pub files: Vec<RawFile>,
    /// Fixed auxiliary files, available as inputs only
    pub auxiliary: Vec<RawFile>,
}

/// Checks that `path` exists and is a directory, returning its absolute form.
pub fn validate_directory(path: &Path, label: &str) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(GraphError::InvalidInput(format!("{} is required", label)));
    }
    if !path.exists() {
        return Err(GraphError::InvalidInput(format!(
            "{} does not exist: {}",
            label,
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(GraphError::InvalidInput(format!(
            "{} must be a directory: {}",
            label,
            path.display()
        )));
    }

    fs::canonicalize(path).map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Scans `dir` and returns every raw file matched by `spec`, sorted by name.
///
/// Fails with [`GraphError::InvalidInput`] if the directory is unusable or the
/// spec does not compile, and with [`GraphError::PatternMismatch`] if a globbed
/// file does not satisfy the extraction pattern.
pub fn resolve(dir: &Path, spec: &FileSetSpec) -> Result<Vec<RawFile>> {
    let dir = validate_directory(dir, "input directory")?;

    let glob = Pattern::new(&spec.glob).map_err(|e| {
        GraphError::InvalidInput(format!("invalid file glob '{}': {}", spec.glob, e))
    })?;
    let extractor = compile_extractor(spec)?;

    let entries = fs::read_dir(&dir).map_err(|source| GraphError::Io {
        path: dir.clone(),
        source,
    })?;

    let mut matched = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| GraphError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let raw_name = entry.file_name();
        let Some(file_name) = raw_name.to_str() else {
            if glob.matches(&raw_name.to_string_lossy()) {
                return Err(GraphError::PatternMismatch {
                    file: path.display().to_string(),
                    reason: "file name is not valid UTF-8".to_string(),
                });
            }
            debug!("Skipping non UTF-8 file name: {}", path.display());
            continue;
        };
        if !glob.matches(file_name) {
            continue;
        }

        matched.push((file_name.to_string(), path.clone()));
    }

    matched.sort_by(|a, b| a.0.cmp(&b.0));

    let mut files = Vec::with_capacity(matched.len());
    for (file_name, path) in matched {
        let params = extract_params(&file_name, extractor.as_ref(), &spec.captures)?;
        let name = ArtifactName::new(file_name.as_str()).map_err(|reason| {
            GraphError::PatternMismatch {
                file: file_name.clone(),
                reason,
            }
        })?;

        debug!("Raw file '{}' -> {:?}", name, params);
        files.push(RawFile { name, path, params });
    }

    info!(
        "Resolved {} raw files matching '{}' in {}",
        files.len(),
        spec.glob,
        dir.display()
    );

    Ok(files)
}

fn compile_extractor(spec: &FileSetSpec) -> Result<Option<Regex>> {
    let Some(pattern) = &spec.pattern else {
        if !spec.captures.is_empty() {
            return Err(GraphError::InvalidInput(
                "capture types declared without an extraction pattern".to_string(),
            ));
        }
        return Ok(None);
    };

    let regex = Regex::new(pattern).map_err(|e| {
        GraphError::InvalidInput(format!("invalid extraction pattern '{}': {}", pattern, e))
    })?;

    let group_names: Vec<&str> = regex.capture_names().flatten().collect();
    for name in spec.captures.keys() {
        if !group_names.contains(&name.as_str()) {
            return Err(GraphError::InvalidInput(format!(
                "capture '{}' is not a named group of '{}'",
                name, pattern
            )));
        }
    }

    Ok(Some(regex))
}

/// Builds the parameter set for one file name.
fn extract_params(
    file_name: &str,
    extractor: Option<&Regex>,
    kinds: &BTreeMap<String, CaptureKind>,
) -> Result<Params> {
    let mut params = Params::new();
    params.insert("name".to_string(), file_name.to_string());

    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    params.insert("stem".to_string(), stem.to_string());

    let Some(regex) = extractor else {
        return Ok(params);
    };

    let captures = regex.captures(file_name).ok_or_else(|| GraphError::PatternMismatch {
        file: file_name.to_string(),
        reason: format!("expected to match '{}'", regex.as_str()),
    })?;

    for group in regex.capture_names().flatten() {
        let Some(value) = captures.name(group) else {
            continue;
        };
        let value = value.as_str();

        if kinds.get(group).copied().unwrap_or_default() == CaptureKind::Integer
            && value.parse::<i64>().is_err()
        {
            return Err(GraphError::PatternMismatch {
                file: file_name.to_string(),
                reason: format!("capture '{}' = '{}' is not an integer", group, value),
            });
        }

        params.insert(group.to_string(), value.to_string());
    }

    Ok(params)
}
