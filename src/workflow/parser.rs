//! Pipeline Parser
//!
//! Loads declarative pipeline definitions from YAML files. Templates in YAML
//! are pattern-only: every argument and file name is a `{placeholder}`
//! pattern rendered against the instance parameters.
//!
//! # Example
//!
//! ```yaml
//! name: two-stage
//! inputs:
//!   glob: "A_*.dat"
//!   pattern: 'A_(?P<epoch>[0-9]{3})\.dat'
//!   captures:
//!     epoch: integer
//! templates:
//!   - name: stage1
//!     site: condorpool
//!     pfn: stage1.sh
//!     arguments: ["-i", "{name}", "-o", "{epoch}.out"]
//!     inputs: "{name}"
//!     outputs: "{epoch}.out"
//!   - name: stage2
//!     site: condorpool
//!     pfn: stage2.sh
//!     inputs: "{epoch}.out"
//!     outputs:
//!       - name: "{epoch}.pdf"
//!         register_replica: false
//! stages:
//!   - name: stage1
//!     template: stage1
//!   - name: stage2
//!     template: stage2
//!     scope:
//!       kind: per_value
//!       param: epoch
//!       values: ["095", "096"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use super::filter::ExclusionRule;
use super::model::Stage;
use super::resolver::FileSetSpec;
use super::template::{JobTemplate, OutputRole, Transformation};
use super::wildcards::{has_wildcards, Params};
use crate::environment::{Arch, Container, Site};
use crate::error::{GraphError, Result};
use crate::pipeline::Pipeline;

/// Top-level layout of a pipeline YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDefinition {
    pub name: String,
    pub inputs: FileSetSpec,
    #[serde(default)]
    pub auxiliary: Vec<PathBuf>,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    pub templates: Vec<TemplateDefinition>,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub exclusions: Vec<ExclusionRule>,
}

/// A job template written as patterns.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateDefinition {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub site: String,
    pub pfn: String,
    #[serde(default = "default_stageable")]
    pub is_stageable: bool,
    #[serde(default)]
    pub arch: Option<Arch>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(deserialize_with = "single_or_vec", default)]
    pub inputs: Vec<String>,
    #[serde(deserialize_with = "outputs", default)]
    pub outputs: Vec<OutputDefinition>,
}

fn default_stageable() -> bool {
    true
}

/// Output file pattern with staging flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDefinition {
    pub name: String,
    #[serde(default = "default_stageable")]
    pub stage_out: bool,
    #[serde(default = "default_stageable")]
    pub register_replica: bool,
}

/// Accepts a single string, a list of strings, or nothing.
fn single_or_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(arr) => arr
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(de::Error::custom("Expected string in array")),
            })
            .collect(),
        _ => Err(de::Error::custom("Expected string or array of strings")),
    }
}

/// Accepts outputs as plain patterns or as `{ name, stage_out, register_replica }` maps.
fn outputs<'de, D>(deserializer: D) -> std::result::Result<Vec<OutputDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    let items = match val {
        Value::Null => return Ok(Vec::new()),
        Value::Array(arr) => arr,
        other => vec![other],
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(name) => Ok(OutputDefinition {
                name,
                stage_out: true,
                register_replica: true,
            }),
            Value::Object(_) => serde_json::from_value(item).map_err(de::Error::custom),
            _ => Err(de::Error::custom("Expected output pattern or output map")),
        })
        .collect()
}

impl TemplateDefinition {
    fn into_template(self) -> JobTemplate {
        let transformation = Transformation {
            name: self.name,
            namespace: self.namespace,
            site: self.site,
            pfn: self.pfn,
            is_stageable: self.is_stageable,
            arch: self.arch,
            container: self.container,
        };

        let template = JobTemplate::new(transformation).with_args(self.arguments);
        let template = self
            .inputs
            .into_iter()
            .fold(template, |t, input| t.with_input(input));

        self.outputs.into_iter().fold(template, |t, output| {
            t.with_output_role(OutputRole {
                rule: output.name.into(),
                stage_out: output.stage_out,
                register_replica: output.register_replica,
            })
        })
    }
}

impl PipelineDefinition {
    /// Converts the definition into a [`Pipeline`].
    pub fn into_pipeline(self) -> Pipeline {
        for template in &self.templates {
            let constant_outputs: Vec<_> = template
                .outputs
                .iter()
                .filter(|o| !has_wildcards(&o.name))
                .map(|o| o.name.as_str())
                .collect();
            if !constant_outputs.is_empty() {
                warn!(
                    "Template '{}' has outputs without placeholders {:?}; \
                     only one instance can produce them",
                    template.name, constant_outputs
                );
            }
        }

        Pipeline {
            name: self.name,
            inputs: self.inputs,
            auxiliary: self.auxiliary,
            params: self.params,
            sites: self.sites,
            containers: self.containers,
            transformations: self.transformations,
            templates: self
                .templates
                .into_iter()
                .map(TemplateDefinition::into_template)
                .collect(),
            stages: self.stages,
            exclusions: self.exclusions,
        }
    }
}

/// Parses a pipeline definition from YAML text.
pub fn parse_pipeline(yaml: &str) -> Result<Pipeline> {
    let definition: PipelineDefinition = serde_yaml::from_str(yaml)?;

    info!(
        "Parsed pipeline '{}': {} templates, {} stages",
        definition.name,
        definition.templates.len(),
        definition.stages.len()
    );

    Ok(definition.into_pipeline())
}

/// Loads a pipeline definition from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use ehtflow::workflow::load_pipeline;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = load_pipeline("pipeline.yaml")?;
///     println!("Loaded {} stages", pipeline.stages.len());
///     Ok(())
/// }
/// ```
pub fn load_pipeline(path: impl AsRef<Path>) -> Result<Pipeline> {
    let path = path.as_ref();
    info!("Loading pipeline from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    parse_pipeline(&yaml_content)
}
