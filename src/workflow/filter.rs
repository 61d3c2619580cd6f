//! Conditional Filter
//!
//! Drops job instances by stage and parameters after expansion, e.g. no
//! summary-image job for high-band files. Dropping a job that an included
//! job still depends on is an error, never a silent skip.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::model::WorkflowGraph;
use super::wildcards::Params;
use crate::error::{GraphError, Result};

/// Decides whether an instance of `stage` with `params` stays in the graph.
pub trait InstanceFilter {
    fn include(&self, stage: &str, params: &Params) -> bool;
}

impl<F> InstanceFilter for F
where
    F: Fn(&str, &Params) -> bool,
{
    fn include(&self, stage: &str, params: &Params) -> bool {
        self(stage, params)
    }
}

/// Excludes instances of `stage` whose `param` contains `contains`.
///
/// ```yaml
/// stage: imgsum
/// param: stem
/// contains: _hi_
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub stage: String,
    pub param: String,
    pub contains: String,
}

impl ExclusionRule {
    pub fn new(
        stage: impl Into<String>,
        param: impl Into<String>,
        contains: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            param: param.into(),
            contains: contains.into(),
        }
    }

    /// Returns true if the rule removes this instance.
    pub fn excludes(&self, stage: &str, params: &Params) -> bool {
        self.stage == stage
            && params
                .get(&self.param)
                .is_some_and(|value| value.contains(&self.contains))
    }
}

impl InstanceFilter for ExclusionRule {
    fn include(&self, stage: &str, params: &Params) -> bool {
        !self.excludes(stage, params)
    }
}

/// Combines exclusion rules: an instance stays unless some rule excludes it.
pub fn exclusions(rules: &[ExclusionRule]) -> impl Fn(&str, &Params) -> bool + '_ {
    move |stage, params| !rules.iter().any(|rule| rule.excludes(stage, params))
}

/// Applies `filter` to every instance and removes the excluded ones.
///
/// Excluded instances lose their outputs and edges. Fails with
/// [`GraphError::OrphanedDependency`] if an included instance consumes an
/// output of an excluded one.
pub fn apply_filter<F>(mut graph: WorkflowGraph, filter: &F) -> Result<WorkflowGraph>
where
    F: InstanceFilter + ?Sized,
{
    for instance in &mut graph.instances {
        if !filter.include(&instance.stage, &instance.params) {
            debug!("Excluding job '{}'", instance.id);
            instance.exclude();
        }
    }

    let excluded: Vec<String> = graph
        .instances
        .iter()
        .filter(|i| !i.included)
        .map(|i| i.id.clone())
        .collect();

    if excluded.is_empty() {
        return Ok(graph);
    }

    for edge in &graph.edges {
        if !excluded.contains(&edge.producer) || excluded.contains(&edge.consumer) {
            continue;
        }

        let artifact = graph
            .get_instance(&edge.producer)
            .zip(graph.get_instance(&edge.consumer))
            .and_then(|(producer, consumer)| {
                producer.output_names().find(|n| consumer.consumes(n)).cloned()
            })
            .map(|n| n.to_string())
            .unwrap_or_default();

        return Err(GraphError::OrphanedDependency {
            consumer: edge.consumer.clone(),
            producer: edge.producer.clone(),
            artifact,
        });
    }

    let WorkflowGraph {
        name,
        stages,
        instances,
        mut artifacts,
        ..
    } = graph;

    artifacts.retain(|_, artifact| {
        artifact
            .producer
            .as_ref()
            .map_or(true, |producer| !excluded.contains(producer))
    });
    for artifact in artifacts.values_mut() {
        artifact.consumers.retain(|c| !excluded.contains(c));
    }

    let instances: Vec<_> = instances.into_iter().filter(|i| i.included).collect();

    info!("Conditional filter excluded {} jobs", excluded.len());
    Ok(WorkflowGraph::new(name, stages, instances, artifacts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::artifact::ArtifactName;
    use crate::workflow::builder::{build_graph, BuildContext};
    use crate::workflow::model::Stage;
    use crate::workflow::resolver::{Inventory, RawFile};
    use crate::workflow::template::{JobTemplate, TemplateCatalog, Transformation};

    fn raw(stem: &str) -> RawFile {
        let name = format!("{}.uvfits", stem);
        RawFile {
            name: ArtifactName::new(name.as_str()).unwrap(),
            path: format!("/data/{}", name).into(),
            params: Params::from([
                ("name".to_string(), name.clone()),
                ("stem".to_string(), stem.to_string()),
            ]),
        }
    }

    fn graph() -> WorkflowGraph {
        let mut catalog = TemplateCatalog::new();
        catalog
            .register(
                JobTemplate::new(Transformation::new("image", "condorpool", "/s/image"))
                    .with_input("{name}")
                    .with_output("{stem}.fits"),
            )
            .unwrap();
        catalog
            .register(
                JobTemplate::new(Transformation::new("imgsum", "condorpool", "/s/imgsum"))
                    .with_input("{stem}.fits")
                    .with_output("{stem}.img.pdf"),
            )
            .unwrap();

        let stages = vec![Stage::new("image", "image"), Stage::new("imgsum", "imgsum")];
        let inventory = Inventory {
            files: vec![raw("M87_095_hi"), raw("M87_095_lo")],
            auxiliary: Vec::new(),
        };
        let globals = Params::new();

        build_graph(&BuildContext {
            name: "filter",
            catalog: &catalog,
            stages: &stages,
            inventory: &inventory,
            globals: &globals,
        })
        .unwrap()
    }

    #[test]
    fn test_exclusion_rule_matching() {
        let rule = ExclusionRule::new("imgsum", "stem", "_hi_");
        let hi = Params::from([("stem".to_string(), "SR1_M87_2017_095_hi_hops".to_string())]);
        let lo = Params::from([("stem".to_string(), "SR1_M87_2017_095_lo_hops".to_string())]);

        assert!(rule.excludes("imgsum", &hi));
        assert!(!rule.excludes("imgsum", &lo));
        assert!(!rule.excludes("imaging", &hi));
        assert!(!rule.excludes("imgsum", &Params::new()));
    }

    #[test]
    fn test_exclude_leaf_succeeds() {
        let rules = vec![ExclusionRule::new("imgsum", "stem", "_hi")];
        let filtered = apply_filter(graph(), &exclusions(&rules)).unwrap();

        assert_eq!(filtered.len(), 3);
        assert!(filtered.get_instance("imgsum:M87_095_hi").is_none());
        assert!(filtered.get_instance("imgsum:M87_095_lo").is_some());
        assert_eq!(filtered.edges.len(), 1);
        assert!(!filtered
            .artifacts
            .contains_key(&ArtifactName::new("M87_095_hi.img.pdf").unwrap()));

        let fits = &filtered.artifacts[&ArtifactName::new("M87_095_hi.fits").unwrap()];
        assert!(fits.consumers.is_empty());
    }

    #[test]
    fn test_exclude_producer_orphans_dependent() {
        let rules = vec![ExclusionRule::new("image", "stem", "_lo")];

        match apply_filter(graph(), &exclusions(&rules)) {
            Err(GraphError::OrphanedDependency { consumer, producer, artifact }) => {
                assert_eq!(consumer, "imgsum:M87_095_lo");
                assert_eq!(producer, "image:M87_095_lo");
                assert_eq!(artifact, "M87_095_lo.fits");
            }
            other => panic!("Expected OrphanedDependency, got {:?}", other),
        };
    }

    #[test]
    fn test_exclude_producer_and_dependent_together() {
        let filter = |_: &str, params: &Params| {
            !params.get("stem").is_some_and(|s| s.ends_with("_lo"))
        };

        let filtered = apply_filter(graph(), &filter).unwrap();
        assert_eq!(filtered.len(), 2);
        assert!(filtered.instances.iter().all(|i| i.included));
    }

    #[test]
    fn test_no_rules_keeps_graph() {
        let original = graph();
        let filtered = apply_filter(original.clone(), &exclusions(&[])).unwrap();
        assert_eq!(filtered, original);
    }
}
