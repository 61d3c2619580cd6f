//! ehtflow - Workflow Graph Generator for EHT Imaging Pipelines
//!
//! Generates the job graph of a multi-stage data-reduction pipeline from a
//! directory of visibility files. Job templates are expanded over the
//! discovered files, dependencies are inferred from the files each job reads
//! and writes, and the validated graph is written out in the executor's
//! workflow format.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`workflow`]: File discovery, templates, graph construction and validation
//! - [`pipeline`]: Pipeline definitions and the built-in EHT pipelines
//! - [`environment`]: Container and execution-site descriptions
//! - [`emit`]: Serialization of the generated graph
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use ehtflow::emit::{emit, EmitFormat, Metadata};
//! use ehtflow::pipeline::{builtin::builtin, GenerateOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = builtin("difmap").ok_or("unknown pipeline")?;
//!
//!     let workflow = pipeline.generate(&GenerateOptions {
//!         uvfits_dir: "/data/uvfits".into(),
//!         scripts_dir: "/data/scripts".into(),
//!         work_dir: std::env::current_dir()?,
//!     })?;
//!
//!     let metadata = Metadata::new("eht", Utc::now());
//!     emit(&workflow, &metadata, EmitFormat::Yaml, std::io::stdout())?;
//!     Ok(())
//! }
//! ```

pub mod emit;
pub mod environment;
pub mod error;
pub mod pipeline;
pub mod workflow;

// Re-export commonly used types
pub use error::{GraphError, Result};
pub use pipeline::{GenerateOptions, GeneratedWorkflow, Pipeline};
pub use workflow::model::{JobInstance, Stage, WorkflowGraph};
pub use workflow::parser::load_pipeline;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "ehtflow";
