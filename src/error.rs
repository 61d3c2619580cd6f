//! Graph Generation Errors
//!
//! Every failure aborts generation; no partial graph is ever emitted.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while resolving inputs, building or emitting a workflow graph.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Bad directory or configuration, reported before any processing.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A discovered file does not follow the expected naming convention.
    #[error("File '{file}' does not match naming convention: {reason}")]
    PatternMismatch { file: String, reason: String },

    #[error("Template '{0}' is already registered")]
    DuplicateTemplate(String),

    #[error("Template '{0}' is not registered")]
    UnknownTemplate(String),

    #[error("Template '{template}': {reason}")]
    RoleEvaluation { template: String, reason: String },

    /// Two producers (or a producer and a raw file) claim the same artifact.
    #[error("Artifact '{artifact}' is claimed by both '{existing}' and '{claimant}'")]
    DuplicateArtifact {
        artifact: String,
        existing: String,
        claimant: String,
    },

    #[error("Job '{0}' is defined more than once")]
    DuplicateJob(String),

    #[error("Job '{job}' requires '{artifact}', which no earlier stage produces and no raw file provides")]
    UnresolvedDependency { job: String, artifact: String },

    #[error("Job '{consumer}' requires '{artifact}' from excluded job '{producer}'")]
    OrphanedDependency {
        consumer: String,
        producer: String,
        artifact: String,
    },

    #[error("Job '{consumer}' (stage '{consumer_stage}') consumes output of '{producer}' from non-earlier stage '{producer_stage}'")]
    OutOfOrderDependency {
        producer: String,
        producer_stage: String,
        consumer: String,
        consumer_stage: String,
    },

    #[error("Workflow graph contains a dependency cycle through: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse pipeline definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Failed to write workflow document: {0}")]
    Emit(String),
}

impl GraphError {
    pub(crate) fn role(template: &str, reason: impl Into<String>) -> Self {
        Self::RoleEvaluation {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}
