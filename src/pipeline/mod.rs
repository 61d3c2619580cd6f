//! Pipeline Definitions
//!
//! A [`Pipeline`] bundles everything needed to generate one workflow: which
//! raw files to pick up, the fixed auxiliary files, the templates and the
//! stages that expand them, plus the site, container and transformation
//! entries that are passed through to the emitted document.
//!
//! [`Pipeline::generate`] runs the whole chain:
//! Resolver → Builder → Filter → Validator.

pub mod builtin;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::environment::{Container, Site};
use crate::error::{GraphError, Result};
use crate::workflow::builder::{build_graph, BuildContext};
use crate::workflow::filter::{apply_filter, exclusions, ExclusionRule};
use crate::workflow::model::{Stage, WorkflowGraph};
use crate::workflow::resolver::{resolve, validate_directory, FileSetSpec, Inventory, RawFile};
use crate::workflow::template::{JobTemplate, TemplateCatalog, Transformation};
use crate::workflow::validator::{topological_order, validate_graph};
use crate::workflow::wildcards::Params;

/// A complete, declarative pipeline definition.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Workflow name written to the emitted document
    pub name: String,
    /// Which files of the uvfits directory are raw inputs
    pub inputs: FileSetSpec,
    /// Fixed raw files; relative paths are taken from the uvfits directory's parent
    pub auxiliary: Vec<PathBuf>,
    /// Constants bound into every job instance
    pub params: Params,
    pub sites: Vec<Site>,
    pub containers: Vec<Container>,
    /// Transformations not attached to any template (e.g. the worker package)
    pub transformations: Vec<Transformation>,
    pub templates: Vec<JobTemplate>,
    /// Stages in execution-precedence order
    pub stages: Vec<Stage>,
    pub exclusions: Vec<ExclusionRule>,
}

/// Directories a pipeline is generated against.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Directory holding the raw visibility files
    pub uvfits_dir: PathBuf,
    /// Directory holding the processing scripts referenced by relative pfns
    pub scripts_dir: PathBuf,
    /// Base for relative site directories
    pub work_dir: PathBuf,
}

/// The validated graph plus the catalogs that accompany it.
#[derive(Debug, Clone)]
pub struct GeneratedWorkflow {
    pub graph: WorkflowGraph,
    /// Instance ids, producers before consumers
    pub order: Vec<String>,
    pub catalog: TemplateCatalog,
    pub transformations: Vec<Transformation>,
    pub sites: Vec<Site>,
    pub containers: Vec<Container>,
}

impl GeneratedWorkflow {
    /// Every transformation of the workflow: standalone entries first, then templates.
    pub fn all_transformations(&self) -> impl Iterator<Item = &Transformation> {
        self.transformations
            .iter()
            .chain(self.catalog.templates().map(|t| &t.transformation))
    }
}

impl Pipeline {
    /// Creates an empty pipeline reading raw files matched by `inputs`.
    pub fn new(name: impl Into<String>, inputs: FileSetSpec) -> Self {
        Self {
            name: name.into(),
            inputs,
            auxiliary: Vec::new(),
            params: Params::new(),
            sites: Vec::new(),
            containers: Vec::new(),
            transformations: Vec::new(),
            templates: Vec::new(),
            stages: Vec::new(),
            exclusions: Vec::new(),
        }
    }

    pub fn with_auxiliary(mut self, path: impl Into<PathBuf>) -> Self {
        self.auxiliary.push(path.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_site(mut self, site: Site) -> Self {
        self.sites.push(site);
        self
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    pub fn with_transformation(mut self, transformation: Transformation) -> Self {
        self.transformations.push(transformation);
        self
    }

    pub fn with_template(mut self, template: JobTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_exclusion(mut self, rule: ExclusionRule) -> Self {
        self.exclusions.push(rule);
        self
    }

    /// Generates the validated workflow for the given directories.
    ///
    /// Both input directories are checked before anything else happens. Any
    /// failure aborts generation; nothing is returned for a partial graph.
    pub fn generate(&self, options: &GenerateOptions) -> Result<GeneratedWorkflow> {
        let uvfits_dir = validate_directory(&options.uvfits_dir, "uvfits directory")?;
        let scripts_dir = validate_directory(&options.scripts_dir, "scripts directory")?;

        info!("Generating workflow '{}'", self.name);
        debug!("  uvfits directory: {}", uvfits_dir.display());
        debug!("  scripts directory: {}", scripts_dir.display());

        self.check_containers()?;

        let files = resolve(&uvfits_dir, &self.inputs)?;
        let auxiliary_base = uvfits_dir.parent().unwrap_or(uvfits_dir.as_path());
        let auxiliary = self
            .auxiliary
            .iter()
            .map(|path| RawFile::auxiliary(absolute(auxiliary_base, path)))
            .collect::<Result<Vec<_>>>()?;
        let inventory = Inventory { files, auxiliary };

        let mut catalog = TemplateCatalog::new();
        for template in &self.templates {
            let mut template = template.clone();
            template.transformation.pfn = resolve_pfn(&scripts_dir, &template.transformation.pfn);
            catalog.register(template)?;
        }

        let transformations = self
            .transformations
            .iter()
            .cloned()
            .map(|mut t| {
                t.pfn = resolve_pfn(&scripts_dir, &t.pfn);
                t
            })
            .collect();

        let sites = self
            .sites
            .iter()
            .cloned()
            .map(|mut site| {
                for directory in &mut site.directories {
                    directory.rebase(&options.work_dir);
                }
                site
            })
            .collect();

        let graph = build_graph(&BuildContext {
            name: &self.name,
            catalog: &catalog,
            stages: &self.stages,
            inventory: &inventory,
            globals: &self.params,
        })?;

        let graph = apply_filter(graph, &exclusions(&self.exclusions))?;
        validate_graph(&graph)?;
        let order = topological_order(&graph)?;

        Ok(GeneratedWorkflow {
            graph,
            order,
            catalog,
            transformations,
            sites,
            containers: self.containers.clone(),
        })
    }

    /// Rejects transformations naming a container the pipeline does not declare.
    fn check_containers(&self) -> Result<()> {
        let mut declared = BTreeSet::new();
        for container in &self.containers {
            if !declared.insert(container.name.as_str()) {
                return Err(GraphError::InvalidInput(format!(
                    "container '{}' is declared more than once",
                    container.name
                )));
            }
        }

        let referenced = self
            .transformations
            .iter()
            .chain(self.templates.iter().map(|t| &t.transformation));

        for transformation in referenced {
            if let Some(container) = &transformation.container {
                if !declared.contains(container.as_str()) {
                    return Err(GraphError::InvalidInput(format!(
                        "transformation '{}' uses undeclared container '{}'",
                        transformation.name, container
                    )));
                }
            }
        }

        Ok(())
    }
}

fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Resolves a relative executable path against the scripts directory.
///
/// URLs (`scheme://...`) and absolute paths are kept as they are.
fn resolve_pfn(scripts_dir: &Path, pfn: &str) -> String {
    if pfn.contains("://") {
        return pfn.to_string();
    }
    absolute(scripts_dir, Path::new(pfn)).display().to_string()
}
