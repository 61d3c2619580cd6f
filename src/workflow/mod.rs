//! Workflow Graph Construction
//!
//! Turns a catalog of job templates and a directory of raw files into a
//! validated dependency graph.
//!
//! # Structure
//!
//! - [`resolver`]: Raw file discovery and file-name parameter extraction
//! - [`template`]: Job templates and the template catalog
//! - [`model`]: Core data structures (Stage, JobInstance, WorkflowGraph)
//! - [`builder`]: Stage expansion and dependency derivation
//! - [`filter`]: Post-expansion instance exclusion
//! - [`validator`]: Stage-order and cycle checks
//! - [`parser`]: YAML pipeline definitions

pub mod artifact;
pub mod builder;
pub mod filter;
pub mod model;
pub mod parser;
pub mod resolver;
pub mod template;
pub mod validator;
pub mod wildcards;

pub use artifact::{Artifact, ArtifactName};
pub use builder::{build_graph, BuildContext};
pub use filter::{apply_filter, exclusions, ExclusionRule, InstanceFilter};
pub use model::{Edge, JobInstance, Scope, Stage, WorkflowGraph};
pub use parser::{load_pipeline, parse_pipeline};
pub use resolver::{resolve, FileSetSpec, Inventory, RawFile};
pub use template::{JobTemplate, OutputRole, Rule, TemplateCatalog, Transformation};
pub use validator::{topological_order, validate_graph};
pub use wildcards::Params;
