//! Artifacts
//!
//! File names double as artifact keys: a job declaring input `X` depends on
//! whichever job declares output `X`. [`ArtifactName`] validates names when
//! they are created so naming mistakes surface while a template is being
//! instantiated, not when the graph is wired together.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::wildcards::has_wildcards;

/// A validated logical file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Validates and wraps a logical file name.
    ///
    /// A name must be non-empty, carry no surrounding whitespace, contain no
    /// path separator and have no unrendered `{placeholder}`.
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();

        if name.is_empty() {
            return Err("artifact name is empty".to_string());
        }
        if name.trim() != name {
            return Err(format!("artifact name '{}' has surrounding whitespace", name));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(format!(
                "artifact name '{}' contains a path separator; use the file name only",
                name
            ));
        }
        if has_wildcards(&name) || name.contains('{') || name.contains('}') {
            return Err(format!("artifact name '{}' has an unresolved placeholder", name));
        }

        Ok(Self(name))
    }

    /// Uses the file name component of a path as the artifact name.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format!("path '{}' has no usable file name", path.display()))?;
        Self::new(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One entry of the artifact table.
///
/// Raw artifacts have a physical location and no producer; produced
/// artifacts have a producer and no location.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: ArtifactName,
    /// Id of the job instance that writes this file
    pub producer: Option<String>,
    /// Ids of job instances that read this file
    pub consumers: Vec<String>,
    /// Physical location of a raw file
    pub location: Option<PathBuf>,
}

impl Artifact {
    pub fn raw(name: ArtifactName, location: impl Into<PathBuf>) -> Self {
        Self {
            name,
            producer: None,
            consumers: Vec::new(),
            location: Some(location.into()),
        }
    }

    pub fn produced(name: ArtifactName, producer: impl Into<String>) -> Self {
        Self {
            name,
            producer: Some(producer.into()),
            consumers: Vec::new(),
            location: None,
        }
    }

    /// Returns true if the file is supplied directly rather than produced.
    pub fn is_raw(&self) -> bool {
        self.producer.is_none()
    }

    /// An artifact must either have a producer or a physical location.
    pub fn is_resolvable(&self) -> bool {
        self.producer.is_some() || self.location.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name_valid() {
        let name = ArtifactName::new("SR1_M87_2017_095_hi_hops_netcal_StokesI.fits").unwrap();
        assert_eq!(name.as_str(), "SR1_M87_2017_095_hi_hops_netcal_StokesI.fits");
        assert_eq!(name.to_string(), name.as_str());
    }

    #[test]
    fn test_artifact_name_rejects_empty() {
        assert!(ArtifactName::new("").is_err());
    }

    #[test]
    fn test_artifact_name_rejects_whitespace() {
        assert!(ArtifactName::new(" a.fits").is_err());
        assert!(ArtifactName::new("a.fits\n").is_err());
    }

    #[test]
    fn test_artifact_name_rejects_paths() {
        let err = ArtifactName::new("out/a.fits").unwrap_err();
        assert!(err.contains("path separator"));
    }

    #[test]
    fn test_artifact_name_rejects_placeholder() {
        assert!(ArtifactName::new("{stem}.fits").is_err());
        assert!(ArtifactName::new("half{.fits").is_err());
    }

    #[test]
    fn test_artifact_name_from_path() {
        let name = ArtifactName::from_path(Path::new("/data/afmhot_10us.cmap")).unwrap();
        assert_eq!(name.as_str(), "afmhot_10us.cmap");
        assert!(ArtifactName::from_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_artifact_kinds() {
        let raw = Artifact::raw(ArtifactName::new("a.uvfits").unwrap(), "/data/a.uvfits");
        assert!(raw.is_raw());
        assert!(raw.is_resolvable());

        let produced = Artifact::produced(ArtifactName::new("a.fits").unwrap(), "imaging_a");
        assert!(!produced.is_raw());
        assert!(produced.is_resolvable());

        let dangling = Artifact {
            name: ArtifactName::new("x").unwrap(),
            producer: None,
            consumers: Vec::new(),
            location: None,
        };
        assert!(!dangling.is_resolvable());
    }
}
