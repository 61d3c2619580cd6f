//! Graph Builder
//!
//! Expands stages into job instances and wires them together through the
//! files they exchange:
//! 1. Register every raw file as an artifact without a producer
//! 2. Expand each stage in declaration order and register its outputs
//! 3. Resolve every declared input against the artifact table
//! 4. Derive edges from the table, then check stage order and acyclicity
//!
//! Any failure aborts the build; no partial graph is returned.

use std::collections::HashSet;

use log::{debug, info};

use super::artifact::Artifact;
use super::model::{instance_id, ArtifactTable, Scope, Stage, WorkflowGraph, ID_SEPARATOR};
use super::resolver::Inventory;
use super::template::TemplateCatalog;
use super::validator::{check_stage_order, topological_order};
use super::wildcards::Params;
use crate::error::{GraphError, Result};

/// Everything the builder reads. Nothing in the context is mutated.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Workflow name
    pub name: &'a str,
    pub catalog: &'a TemplateCatalog,
    /// Stages in execution-precedence order
    pub stages: &'a [Stage],
    pub inventory: &'a Inventory,
    /// Constants bound into every instance
    pub globals: &'a Params,
}

/// One concrete parameter set produced by a stage scope.
struct Binding {
    key: String,
    params: Params,
}

/// Builds the workflow graph described by `ctx`.
pub fn build_graph(ctx: &BuildContext<'_>) -> Result<WorkflowGraph> {
    info!(
        "Building workflow '{}': {} stages, {} raw files, {} auxiliary files",
        ctx.name,
        ctx.stages.len(),
        ctx.inventory.files.len(),
        ctx.inventory.auxiliary.len()
    );

    check_stages(ctx)?;

    let mut artifacts = register_raw_artifacts(ctx.inventory)?;
    let mut instances = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    // Expand stages and claim outputs
    for stage in ctx.stages {
        let bindings = bindings_for(stage, ctx.inventory);
        debug!(
            "Stage '{}' expands into {} instances",
            stage.name,
            bindings.len()
        );

        for binding in bindings {
            let id = instance_id(&stage.name, &binding.key);
            if !seen_ids.insert(id.clone()) {
                return Err(GraphError::DuplicateJob(id));
            }

            let mut params = ctx.globals.clone();
            params.extend(stage.params.clone());
            params.extend(binding.params);

            let instance = ctx
                .catalog
                .instantiate(&stage.template, id, &stage.name, params)?;

            for output in instance.output_names() {
                if let Some(existing) = artifacts.get(output) {
                    return Err(GraphError::DuplicateArtifact {
                        artifact: output.to_string(),
                        existing: describe_owner(existing),
                        claimant: instance.id.clone(),
                    });
                }
                artifacts.insert(output.clone(), Artifact::produced(output.clone(), &instance.id));
            }

            debug!(
                "  Created job '{}' with inputs={:?}, outputs={:?}",
                instance.id,
                instance.inputs,
                instance.output_names().collect::<Vec<_>>()
            );
            instances.push(instance);
        }
    }

    // Resolve inputs
    for instance in &instances {
        for input in &instance.inputs {
            let artifact = artifacts
                .get_mut(input)
                .ok_or_else(|| GraphError::UnresolvedDependency {
                    job: instance.id.clone(),
                    artifact: input.to_string(),
                })?;

            if !artifact.consumers.contains(&instance.id) {
                artifact.consumers.push(instance.id.clone());
            }
        }
    }

    let graph = WorkflowGraph::new(
        ctx.name,
        ctx.stages.iter().map(|s| s.name.clone()).collect(),
        instances,
        artifacts,
    );

    check_stage_order(&graph)?;
    topological_order(&graph)?;

    info!(
        "Built workflow '{}': {} jobs, {} artifacts, {} dependencies",
        graph.name,
        graph.len(),
        graph.artifacts.len(),
        graph.edges.len()
    );

    Ok(graph)
}

/// Rejects duplicate or malformed stage names and stages naming unknown templates.
fn check_stages(ctx: &BuildContext<'_>) -> Result<()> {
    let mut names = HashSet::new();
    for stage in ctx.stages {
        if stage.name.is_empty() || stage.name.contains(ID_SEPARATOR) {
            return Err(GraphError::InvalidInput(format!(
                "stage name '{}' must be non-empty and must not contain '{}'",
                stage.name, ID_SEPARATOR
            )));
        }
        if !names.insert(stage.name.as_str()) {
            return Err(GraphError::InvalidInput(format!(
                "stage '{}' is declared more than once",
                stage.name
            )));
        }
        if !ctx.catalog.contains(&stage.template) {
            return Err(GraphError::UnknownTemplate(stage.template.clone()));
        }
    }
    Ok(())
}

fn register_raw_artifacts(inventory: &Inventory) -> Result<ArtifactTable> {
    let mut artifacts = ArtifactTable::new();

    for file in inventory.files.iter().chain(&inventory.auxiliary) {
        if let Some(existing) = artifacts.get(&file.name) {
            return Err(GraphError::DuplicateArtifact {
                artifact: file.name.to_string(),
                existing: describe_owner(existing),
                claimant: format!("raw file {}", file.path.display()),
            });
        }
        artifacts.insert(file.name.clone(), Artifact::raw(file.name.clone(), &file.path));
    }

    Ok(artifacts)
}

fn bindings_for(stage: &Stage, inventory: &Inventory) -> Vec<Binding> {
    match &stage.scope {
        Scope::PerRawFile => inventory
            .files
            .iter()
            .map(|file| Binding {
                key: file.stem().to_string(),
                params: file.params.clone(),
            })
            .collect(),
        Scope::PerValue { param, values } => values
            .iter()
            .map(|value| Binding {
                key: value.clone(),
                params: Params::from([(param.clone(), value.clone())]),
            })
            .collect(),
        Scope::Once => vec![Binding {
            key: stage.name.clone(),
            params: Params::new(),
        }],
    }
}

fn describe_owner(artifact: &Artifact) -> String {
    match (&artifact.producer, &artifact.location) {
        (Some(producer), _) => producer.clone(),
        (None, Some(location)) => format!("raw file {}", location.display()),
        (None, None) => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::artifact::ArtifactName;
    use crate::workflow::resolver::RawFile;
    use crate::workflow::template::{JobTemplate, Transformation};

    fn raw(name: &str, epoch: &str) -> RawFile {
        let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
        RawFile {
            name: ArtifactName::new(name).unwrap(),
            path: format!("/data/{}", name).into(),
            params: Params::from([
                ("name".to_string(), name.to_string()),
                ("stem".to_string(), stem.to_string()),
                ("epoch".to_string(), epoch.to_string()),
            ]),
        }
    }

    fn inventory() -> Inventory {
        Inventory {
            files: vec![raw("A_095.dat", "095"), raw("A_096.dat", "096")],
            auxiliary: Vec::new(),
        }
    }

    fn two_stage_catalog() -> TemplateCatalog {
        let mut catalog = TemplateCatalog::new();
        catalog
            .register(
                JobTemplate::new(Transformation::new("stage1", "condorpool", "/s/stage1"))
                    .with_args(["{name}"])
                    .with_input("{name}")
                    .with_output("{epoch}.out"),
            )
            .unwrap();
        catalog
            .register(
                JobTemplate::new(Transformation::new("stage2", "condorpool", "/s/stage2"))
                    .with_input("{epoch}.out")
                    .with_output("{epoch}.pdf"),
            )
            .unwrap();
        catalog
    }

    fn build(catalog: &TemplateCatalog, stages: &[Stage], inventory: &Inventory) -> Result<WorkflowGraph> {
        let globals = Params::new();
        build_graph(&BuildContext {
            name: "test",
            catalog,
            stages,
            inventory,
            globals: &globals,
        })
    }

    #[test]
    fn test_two_stage_per_epoch() {
        let catalog = two_stage_catalog();
        let stages = vec![Stage::new("stage1", "stage1"), Stage::new("stage2", "stage2")];

        let graph = build(&catalog, &stages, &inventory()).unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.parents_of("stage2:A_095"), vec!["stage1:A_095"]);
        assert_eq!(graph.parents_of("stage2:A_096"), vec!["stage1:A_096"]);
        assert!(graph.parents_of("stage1:A_095").is_empty());
    }

    #[test]
    fn test_every_edge_links_output_to_input() {
        let catalog = two_stage_catalog();
        let stages = vec![Stage::new("stage1", "stage1"), Stage::new("stage2", "stage2")];
        let graph = build(&catalog, &stages, &inventory()).unwrap();

        for edge in &graph.edges {
            let producer = graph.get_instance(&edge.producer).unwrap();
            let consumer = graph.get_instance(&edge.consumer).unwrap();
            assert!(producer.output_names().any(|n| consumer.consumes(n)));
        }
    }

    #[test]
    fn test_raw_inputs_create_no_edges() {
        let catalog = two_stage_catalog();
        let stages = vec![Stage::new("stage1", "stage1")];
        let graph = build(&catalog, &stages, &inventory()).unwrap();

        assert_eq!(graph.len(), 2);
        assert!(graph.edges.is_empty());

        let raw = &graph.artifacts[&ArtifactName::new("A_095.dat").unwrap()];
        assert!(raw.is_raw());
        assert_eq!(raw.consumers, vec!["stage1:A_095"]);
    }

    #[test]
    fn test_empty_inventory_gives_empty_graph() {
        let catalog = two_stage_catalog();
        let stages = vec![Stage::new("stage1", "stage1"), Stage::new("stage2", "stage2")];
        let empty = Inventory::default();

        let graph = build(&catalog, &stages, &empty).unwrap();
        assert!(graph.is_empty());
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_per_value_stage() {
        let catalog = two_stage_catalog();
        let stages = vec![
            Stage::new("stage1", "stage1"),
            Stage::new("summary", "stage2").per_value("epoch", ["095"]),
        ];

        let graph = build(&catalog, &stages, &inventory()).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.parents_of("summary:095"), vec!["stage1:A_095"]);
        assert!(graph.children_of("stage1:A_096").is_empty());
    }

    #[test]
    fn test_missing_input_is_unresolved() {
        let mut catalog = two_stage_catalog();
        catalog
            .register(
                JobTemplate::new(Transformation::new("stage2m", "condorpool", "/s/stage2"))
                    .with_input("{epoch}.missing")
                    .with_output("{epoch}.pdf"),
            )
            .unwrap();
        let stages = vec![Stage::new("stage1", "stage1"), Stage::new("stage2", "stage2m")];

        match build(&catalog, &stages, &inventory()) {
            Err(GraphError::UnresolvedDependency { job, artifact }) => {
                assert_eq!(job, "stage2:A_095");
                assert_eq!(artifact, "095.missing");
            }
            other => panic!("Expected UnresolvedDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_colliding_outputs_fail() {
        let mut catalog = TemplateCatalog::new();
        catalog
            .register(
                JobTemplate::new(Transformation::new("flat", "local", "/s/flat"))
                    .with_input("{name}")
                    .with_output("summary.pdf"),
            )
            .unwrap();
        let stages = vec![Stage::new("flat", "flat")];

        match build(&catalog, &stages, &inventory()) {
            Err(GraphError::DuplicateArtifact { artifact, existing, claimant }) => {
                assert_eq!(artifact, "summary.pdf");
                assert_eq!(existing, "flat:A_095");
                assert_eq!(claimant, "flat:A_096");
            }
            other => panic!("Expected DuplicateArtifact, got {:?}", other),
        }
    }

    #[test]
    fn test_output_shadowing_raw_file_fails() {
        let mut catalog = TemplateCatalog::new();
        catalog
            .register(
                JobTemplate::new(Transformation::new("copy", "local", "/s/copy"))
                    .with_output("A_095.dat"),
            )
            .unwrap();
        let stages = vec![Stage::new("copy", "copy").once()];

        assert!(matches!(
            build(&catalog, &stages, &inventory()),
            Err(GraphError::DuplicateArtifact { .. })
        ));
    }

    #[test]
    fn test_back_reference_fails() {
        let mut catalog = TemplateCatalog::new();
        catalog
            .register(
                JobTemplate::new(Transformation::new("early", "local", "/s/early"))
                    .with_input("late.out")
                    .with_output("early.out"),
            )
            .unwrap();
        catalog
            .register(
                JobTemplate::new(Transformation::new("late", "local", "/s/late"))
                    .with_output("late.out"),
            )
            .unwrap();
        let stages = vec![Stage::new("early", "early").once(), Stage::new("late", "late").once()];

        assert!(matches!(
            build(&catalog, &stages, &Inventory::default()),
            Err(GraphError::OutOfOrderDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_template_fails_before_expansion() {
        let catalog = two_stage_catalog();
        let stages = vec![Stage::new("x", "ghost")];

        assert!(matches!(
            build(&catalog, &stages, &Inventory::default()),
            Err(GraphError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_duplicate_stage_name() {
        let catalog = two_stage_catalog();
        let stages = vec![Stage::new("s", "stage1"), Stage::new("s", "stage2")];

        assert!(matches!(
            build(&catalog, &stages, &inventory()),
            Err(GraphError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_duplicate_job_id() {
        let catalog = two_stage_catalog();
        let stages = vec![Stage::new("stage2", "stage2").per_value("epoch", ["095", "095"])];

        assert!(matches!(
            build(&catalog, &stages, &Inventory::default()),
            Err(GraphError::DuplicateJob(_))
        ));
    }

    #[test]
    fn test_underscored_stage_and_key_do_not_collide() {
        let mut catalog = TemplateCatalog::new();
        catalog
            .register(
                JobTemplate::new(Transformation::new("post", "local", "/s/post"))
                    .with_input("{name}")
                    .with_output("{stem}{variant}.out"),
            )
            .unwrap();
        let stages = vec![
            Stage::new("post", "post").with_param("variant", ""),
            Stage::new("post_nores", "post").with_param("variant", ".nores"),
        ];
        let inventory = Inventory {
            files: vec![raw("A_095.dat", "095"), raw("nores_A_095.dat", "095")],
            auxiliary: Vec::new(),
        };

        let graph = build(&catalog, &stages, &inventory).unwrap();
        assert_eq!(graph.len(), 4);
        assert!(graph.get_instance("post:nores_A_095").is_some());
        assert!(graph.get_instance("post_nores:A_095").is_some());
    }

    #[test]
    fn test_stage_name_with_separator_rejected() {
        let catalog = two_stage_catalog();
        let stages = vec![Stage::new("stage1:a", "stage1")];

        assert!(matches!(
            build(&catalog, &stages, &inventory()),
            Err(GraphError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_stage_params_and_globals() {
        let mut catalog = TemplateCatalog::new();
        catalog
            .register(
                JobTemplate::new(Transformation::new("post", "local", "/s/post"))
                    .with_args(["--cmap", "{colormap}"])
                    .with_output("{stem}{variant}.pdf"),
            )
            .unwrap();
        let stages = vec![
            Stage::new("post", "post").with_param("variant", ""),
            Stage::new("post_nores", "post").with_param("variant", ".noresiduals"),
        ];
        let globals = Params::from([("colormap".to_string(), "afmhot_10us.cmap".to_string())]);
        let inventory = inventory();

        let graph = build_graph(&BuildContext {
            name: "variants",
            catalog: &catalog,
            stages: &stages,
            inventory: &inventory,
            globals: &globals,
        })
        .unwrap();

        assert_eq!(graph.len(), 4);
        let job = graph.get_instance("post_nores:A_095").unwrap();
        assert_eq!(job.outputs[0].name.as_str(), "A_095.noresiduals.pdf");
        assert_eq!(job.arguments, vec!["--cmap", "afmhot_10us.cmap"]);
    }
}
