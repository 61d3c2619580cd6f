//! Graph Emitter
//!
//! Serializes a generated workflow into the document consumed by the
//! workflow executor. Building the document is pure; writing it touches only
//! the given writer.

pub mod document;

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use log::info;

pub use document::{build_document, job_id, Metadata, WorkflowDocument};

use crate::error::{GraphError, Result};
use crate::pipeline::GeneratedWorkflow;

/// Serialization format of the emitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitFormat {
    #[default]
    Yaml,
    Json,
}

impl FromStr for EmitFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown output format: {} (expected yaml or json)", other)),
        }
    }
}

impl fmt::Display for EmitFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yaml => write!(f, "yaml"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Writes `document` to `writer` in the requested format.
pub fn write_document<W: Write>(document: &WorkflowDocument, format: EmitFormat, mut writer: W) -> Result<()> {
    match format {
        EmitFormat::Yaml => serde_yaml::to_writer(&mut writer, document)
            .map_err(|e| GraphError::Emit(e.to_string()))?,
        EmitFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, document)
                .map_err(|e| GraphError::Emit(e.to_string()))?;
            writeln!(writer).map_err(|e| GraphError::Emit(e.to_string()))?;
        }
    }
    writer.flush().map_err(|e| GraphError::Emit(e.to_string()))
}

/// Builds and writes the document for `workflow` in one step.
pub fn emit<W: Write>(
    workflow: &GeneratedWorkflow,
    metadata: &Metadata,
    format: EmitFormat,
    writer: W,
) -> Result<WorkflowDocument> {
    let document = build_document(workflow, metadata)?;
    write_document(&document, format, writer)?;

    info!(
        "Emitted workflow '{}' ({}): {} jobs, {} dependencies, {} replicas",
        document.name,
        format,
        document.jobs.len(),
        document.job_dependencies.len(),
        document.replica_catalog.replicas.len()
    );

    Ok(document)
}
