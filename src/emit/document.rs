//! Workflow Document Layout
//!
//! Serde structures mirroring the executor's 5.0 workflow format, and the
//! pure conversion from a generated workflow into them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::environment::{Arch, Container, Site};
use crate::error::{GraphError, Result};
use crate::pipeline::GeneratedWorkflow;
use crate::workflow::template::Transformation;

pub const FORMAT_VERSION: &str = "5.0";

/// Provenance written under `x-pegasus`.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub created_by: String,
    pub created_on: DateTime<Utc>,
}

impl Metadata {
    pub fn new(created_by: impl Into<String>, created_on: DateTime<Utc>) -> Self {
        Self {
            created_by: created_by.into(),
            created_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowDocument {
    pub pegasus: &'static str,
    pub name: String,
    #[serde(rename = "x-pegasus")]
    pub provenance: Provenance,
    #[serde(rename = "siteCatalog", skip_serializing_if = "Option::is_none")]
    pub site_catalog: Option<SiteCatalog>,
    #[serde(rename = "replicaCatalog")]
    pub replica_catalog: ReplicaCatalog,
    #[serde(rename = "transformationCatalog")]
    pub transformation_catalog: TransformationCatalog,
    pub jobs: Vec<JobEntry>,
    #[serde(rename = "jobDependencies")]
    pub job_dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub created_by: String,
    pub created_on: String,
    pub api_lang: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteCatalog {
    pub sites: Vec<Site>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicaCatalog {
    pub replicas: Vec<Replica>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replica {
    pub lfn: String,
    pub pfns: Vec<ReplicaLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicaLocation {
    pub site: String,
    pub pfn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformationCatalog {
    pub transformations: Vec<TransformationEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformationEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub sites: Vec<TransformationSite>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformationSite {
    pub name: String,
    pub pfn: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<Arch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl From<&Transformation> for TransformationEntry {
    fn from(t: &Transformation) -> Self {
        Self {
            namespace: t.namespace.clone(),
            name: t.name.clone(),
            sites: vec![TransformationSite {
                name: t.site.clone(),
                pfn: t.pfn.clone(),
                kind: if t.is_stageable { "stageable" } else { "installed" },
                arch: t.arch,
                container: t.container.clone(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEntry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub id: String,
    pub arguments: Vec<String>,
    pub uses: Vec<FileUse>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUse {
    pub lfn: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_out: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_replica: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dependency {
    pub id: String,
    pub children: Vec<String>,
}

/// Executor job id for the `index`-th job (zero-based): `ID0000001`, `ID0000002`, ...
pub fn job_id(index: usize) -> String {
    format!("ID{:07}", index + 1)
}

/// Builds the document for a generated workflow.
///
/// Jobs appear in topological order and are numbered in that order. The
/// result depends only on the arguments.
pub fn build_document(workflow: &GeneratedWorkflow, metadata: &Metadata) -> Result<WorkflowDocument> {
    let graph = &workflow.graph;

    let ids: BTreeMap<&str, String> = workflow
        .order
        .iter()
        .enumerate()
        .map(|(index, instance)| (instance.as_str(), job_id(index)))
        .collect();

    let id_of = |instance: &str| {
        ids.get(instance)
            .cloned()
            .ok_or_else(|| GraphError::Emit(format!("job '{}' is missing from the emit order", instance)))
    };

    let mut jobs = Vec::with_capacity(workflow.order.len());
    for instance_id in &workflow.order {
        let instance = graph
            .get_instance(instance_id)
            .ok_or_else(|| GraphError::Emit(format!("unknown job '{}'", instance_id)))?;
        let namespace = workflow
            .catalog
            .get(&instance.template)
            .and_then(|t| t.transformation.namespace.clone());

        let inputs = instance.inputs.iter().map(|name| FileUse {
            lfn: name.to_string(),
            kind: "input",
            stage_out: None,
            register_replica: None,
        });
        let outputs = instance.outputs.iter().map(|output| FileUse {
            lfn: output.name.to_string(),
            kind: "output",
            stage_out: Some(output.stage_out),
            register_replica: Some(output.register_replica),
        });

        jobs.push(JobEntry {
            kind: "job",
            namespace,
            name: instance.template.clone(),
            id: id_of(&instance.id)?,
            arguments: instance.arguments.clone(),
            uses: inputs.chain(outputs).collect(),
        });
    }

    let mut job_dependencies = Vec::new();
    for instance_id in &workflow.order {
        let children: BTreeSet<String> = graph
            .children_of(instance_id)
            .into_iter()
            .map(|child| id_of(child))
            .collect::<Result<_>>()?;
        if !children.is_empty() {
            job_dependencies.push(Dependency {
                id: id_of(instance_id)?,
                children: children.into_iter().collect(),
            });
        }
    }

    let replicas = graph
        .raw_artifacts()
        .map(|artifact| {
            let location = artifact.location.as_ref().ok_or_else(|| {
                GraphError::Emit(format!("raw file '{}' has no location", artifact.name))
            })?;
            Ok(Replica {
                lfn: artifact.name.to_string(),
                pfns: vec![ReplicaLocation {
                    site: "local".to_string(),
                    pfn: location.display().to_string(),
                }],
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let site_catalog = if workflow.sites.is_empty() {
        None
    } else {
        Some(SiteCatalog {
            sites: workflow.sites.clone(),
        })
    };

    Ok(WorkflowDocument {
        pegasus: FORMAT_VERSION,
        name: graph.name.clone(),
        provenance: Provenance {
            created_by: metadata.created_by.clone(),
            created_on: metadata.created_on.format("%m-%d-%yT%H:%M:%SZ").to_string(),
            api_lang: "rust",
        },
        site_catalog,
        replica_catalog: ReplicaCatalog { replicas },
        transformation_catalog: TransformationCatalog {
            transformations: workflow.all_transformations().map(Into::into).collect(),
            containers: workflow.containers.clone(),
        },
        jobs,
        job_dependencies,
    })
}
