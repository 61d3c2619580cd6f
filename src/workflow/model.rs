//! Workflow Graph Model
//!
//! Core data structures for a generated workflow: stages that say how a
//! template is expanded, the job instances produced by expansion, and the
//! graph tying instances together through the artifacts they exchange.
//!
//! # Example Stage Definitions
//!
//! ```yaml
//! stages:
//!   - name: imaging
//!     template: difmapp
//!     scope:
//!       kind: per_raw_file
//!
//!   - name: postprocess
//!     template: eht-imaging_postprocessing
//!     scope:
//!       kind: per_value
//!       param: epoch
//!       values: ["095", "096", "100", "101"]
//!     params:
//!       variant: .noresiduals
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::artifact::{Artifact, ArtifactName};
use super::wildcards::Params;

/// How many instances a stage expands into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// One instance per discovered raw file, keyed by file stem
    PerRawFile,
    /// One instance per fixed token bound to `param`, keyed by the token
    PerValue { param: String, values: Vec<String> },
    /// A single instance, keyed by the stage name
    Once,
}

impl Default for Scope {
    fn default() -> Self {
        Self::PerRawFile
    }
}

/// One step of a pipeline: a template applied over a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Unique stage name, also the prefix of instance ids
    pub name: String,

    /// Name of the registered template to instantiate
    pub template: String,

    #[serde(default)]
    pub scope: Scope,

    /// Constants bound into every instance of this stage
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: Params,
}

impl Stage {
    /// Creates a per-raw-file stage.
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            scope: Scope::PerRawFile,
            params: Params::new(),
        }
    }

    /// Expands once per value, binding each value to `param`.
    pub fn per_value<I, S>(mut self, param: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = Scope::PerValue {
            param: param.into(),
            values: values.into_iter().map(Into::into).collect(),
        };
        self
    }

    pub fn once(mut self) -> Self {
        self.scope = Scope::Once;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// An output file declared by a job instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredOutput {
    pub name: ArtifactName,
    pub stage_out: bool,
    pub register_replica: bool,
}

/// Separator between the stage name and the binding key of an instance id.
/// Stage names may not contain it.
pub const ID_SEPARATOR: char = ':';

/// Id of the instance that `stage` expands for `key`.
pub fn instance_id(stage: &str, key: &str) -> String {
    format!("{}{}{}", stage, ID_SEPARATOR, key)
}

/// A template bound to one concrete parameter set.
///
/// Instances are never modified after creation, except for the inclusion
/// flag set by the conditional filter.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInstance {
    /// Unique id, `{stage}:{key}`
    pub id: String,
    /// Stage that produced this instance
    pub stage: String,
    /// Template (and transformation) name
    pub template: String,
    pub params: Params,
    pub arguments: Vec<String>,
    pub inputs: Vec<ArtifactName>,
    pub outputs: Vec<DeclaredOutput>,
    pub included: bool,
}

impl JobInstance {
    pub fn new(
        id: impl Into<String>,
        stage: impl Into<String>,
        template: impl Into<String>,
        params: Params,
        arguments: Vec<String>,
        inputs: Vec<ArtifactName>,
        outputs: Vec<DeclaredOutput>,
    ) -> Self {
        Self {
            id: id.into(),
            stage: stage.into(),
            template: template.into(),
            params,
            arguments,
            inputs,
            outputs,
            included: true,
        }
    }

    pub fn output_names(&self) -> impl Iterator<Item = &ArtifactName> {
        self.outputs.iter().map(|o| &o.name)
    }

    pub fn produces(&self, name: &ArtifactName) -> bool {
        self.output_names().any(|n| n == name)
    }

    pub fn consumes(&self, name: &ArtifactName) -> bool {
        self.inputs.contains(name)
    }

    pub(crate) fn exclude(&mut self) {
        self.included = false;
    }
}

/// Execution-order relation between two job instances.
///
/// Edges are always derived from artifact bindings, see [`derive_edges`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
    pub producer: String,
    pub consumer: String,
}

/// Artifact table keyed by name.
pub type ArtifactTable = BTreeMap<ArtifactName, Artifact>;

/// Derives the dependency edges implied by an artifact table.
///
/// One edge links the producer of every artifact to each of its consumers.
/// Raw artifacts contribute no edges.
pub fn derive_edges(artifacts: &ArtifactTable) -> BTreeSet<Edge> {
    artifacts
        .values()
        .filter_map(|artifact| artifact.producer.as_ref().map(|p| (p, &artifact.consumers)))
        .flat_map(|(producer, consumers)| {
            consumers.iter().map(move |consumer| Edge {
                producer: producer.clone(),
                consumer: consumer.clone(),
            })
        })
        .collect()
}

/// Job instances plus the artifacts and edges connecting them.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    pub name: String,
    /// Stage names in declaration order
    pub stages: Vec<String>,
    /// Instances in expansion order
    pub instances: Vec<JobInstance>,
    pub artifacts: ArtifactTable,
    pub edges: BTreeSet<Edge>,
}

impl WorkflowGraph {
    /// Creates a graph, deriving its edges from the artifact table.
    pub fn new(
        name: impl Into<String>,
        stages: Vec<String>,
        instances: Vec<JobInstance>,
        artifacts: ArtifactTable,
    ) -> Self {
        let edges = derive_edges(&artifacts);
        Self {
            name: name.into(),
            stages,
            instances,
            artifacts,
            edges,
        }
    }

    pub fn get_instance(&self, id: &str) -> Option<&JobInstance> {
        self.instances.iter().find(|i| i.id == id)
    }

    /// Position of a stage in declaration order.
    pub fn stage_index(&self, stage: &str) -> Option<usize> {
        self.stages.iter().position(|s| s == stage)
    }

    /// Ids of instances that must run before `id`.
    pub fn parents_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.consumer == id)
            .map(|e| e.producer.as_str())
            .collect()
    }

    /// Ids of instances that consume outputs of `id`.
    pub fn children_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.producer == id)
            .map(|e| e.consumer.as_str())
            .collect()
    }

    /// Returns instances with no dependencies (entry points).
    pub fn root_instances(&self) -> Vec<&JobInstance> {
        self.instances
            .iter()
            .filter(|i| !self.edges.iter().any(|e| e.consumer == i.id))
            .collect()
    }

    /// Returns instances nothing depends on (exit points).
    pub fn leaf_instances(&self) -> Vec<&JobInstance> {
        self.instances
            .iter()
            .filter(|i| !self.edges.iter().any(|e| e.producer == i.id))
            .collect()
    }

    /// Raw artifacts in name order.
    pub fn raw_artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values().filter(|a| a.is_raw())
    }

    /// Names of the templates used by at least one instance.
    pub fn used_templates(&self) -> BTreeSet<&str> {
        self.instances.iter().map(|i| i.template.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ArtifactName {
        ArtifactName::new(s).unwrap()
    }

    fn job(id: &str, stage: &str, inputs: &[&str], outputs: &[&str]) -> JobInstance {
        JobInstance::new(
            id,
            stage,
            stage,
            Params::new(),
            Vec::new(),
            inputs.iter().map(|s| name(s)).collect(),
            outputs
                .iter()
                .map(|s| DeclaredOutput {
                    name: name(s),
                    stage_out: true,
                    register_replica: true,
                })
                .collect(),
        )
    }

    fn chain_graph() -> WorkflowGraph {
        let mut artifacts = ArtifactTable::new();
        let mut raw = Artifact::raw(name("a.dat"), "/data/a.dat");
        raw.consumers.push("s1_a".to_string());
        artifacts.insert(raw.name.clone(), raw);

        let mut out = Artifact::produced(name("a.out"), "s1_a");
        out.consumers.push("s2_a".to_string());
        artifacts.insert(out.name.clone(), out);

        artifacts.insert(name("a.pdf"), Artifact::produced(name("a.pdf"), "s2_a"));

        WorkflowGraph::new(
            "chain",
            vec!["s1".to_string(), "s2".to_string()],
            vec![
                job("s1_a", "s1", &["a.dat"], &["a.out"]),
                job("s2_a", "s2", &["a.out"], &["a.pdf"]),
            ],
            artifacts,
        )
    }

    #[test]
    fn test_stage_builders() {
        let stage = Stage::new("post", "difmap-postprocessing").with_param("variant", ".noresiduals");
        assert_eq!(stage.scope, Scope::PerRawFile);
        assert_eq!(stage.params["variant"], ".noresiduals");

        let stage = Stage::new("post", "t").per_value("epoch", ["095", "096"]);
        assert!(matches!(stage.scope, Scope::PerValue { ref values, .. } if values.len() == 2));

        assert_eq!(Stage::new("once", "t").once().scope, Scope::Once);
    }

    #[test]
    fn test_stage_from_yaml() {
        let yaml = r#"
name: postprocess
template: post
scope:
  kind: per_value
  param: epoch
  values: ["095", "096"]
"#;
        let stage: Stage = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            stage.scope,
            Scope::PerValue {
                param: "epoch".to_string(),
                values: vec!["095".to_string(), "096".to_string()],
            }
        );

        let stage: Stage = serde_yaml::from_str("name: a\ntemplate: b\n").unwrap();
        assert_eq!(stage.scope, Scope::PerRawFile);

        let stage: Stage = serde_yaml::from_str("name: a\ntemplate: b\nscope:\n  kind: once\n").unwrap();
        assert_eq!(stage.scope, Scope::Once);
    }

    #[test]
    fn test_job_instance_queries() {
        let instance = job("s2_a", "s2", &["a.out"], &["a.pdf"]);
        assert!(instance.consumes(&name("a.out")));
        assert!(instance.produces(&name("a.pdf")));
        assert!(!instance.produces(&name("a.out")));
        assert!(instance.included);
    }

    #[test]
    fn test_derive_edges_skips_raw() {
        let graph = chain_graph();
        assert_eq!(graph.edges.len(), 1);

        let edge = graph.edges.iter().next().unwrap();
        assert_eq!(edge.producer, "s1_a");
        assert_eq!(edge.consumer, "s2_a");
    }

    #[test]
    fn test_derive_edges_deduplicates() {
        let mut artifacts = ArtifactTable::new();
        for file in ["x.fits", "x.mod"] {
            let mut a = Artifact::produced(name(file), "p");
            a.consumers.push("c".to_string());
            artifacts.insert(a.name.clone(), a);
        }
        assert_eq!(derive_edges(&artifacts).len(), 1);
    }

    #[test]
    fn test_graph_navigation() {
        let graph = chain_graph();

        assert_eq!(graph.parents_of("s2_a"), vec!["s1_a"]);
        assert_eq!(graph.children_of("s1_a"), vec!["s2_a"]);
        assert_eq!(graph.root_instances()[0].id, "s1_a");
        assert_eq!(graph.leaf_instances()[0].id, "s2_a");
        assert_eq!(graph.stage_index("s2"), Some(1));
        assert_eq!(graph.raw_artifacts().count(), 1);
        assert_eq!(graph.used_templates().len(), 2);
        assert!(graph.get_instance("missing").is_none());
        assert_eq!(graph.len(), 2);
        assert!(!graph.is_empty());
    }
}
