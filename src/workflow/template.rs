//! Job Templates
//!
//! A template is a reusable job shape: which transformation to run, how to
//! build its argument list, and how to name the files it reads and writes,
//! all as functions of the instance parameters. The [`TemplateCatalog`] owns
//! registered templates and binds them into [`JobInstance`]s.

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::artifact::ArtifactName;
use super::model::{DeclaredOutput, JobInstance};
use super::wildcards::{render, Params};
use crate::environment::Arch;
use crate::error::{GraphError, Result};

type RuleFn = dyn Fn(&Params) -> std::result::Result<String, String> + Send + Sync;

/// Produces one string (an argument or a file name) from instance parameters.
#[derive(Clone)]
pub enum Rule {
    /// `{placeholder}` pattern rendered against the parameters
    Pattern(String),
    /// Arbitrary pure function of the parameters
    Computed(Arc<RuleFn>),
}

impl Rule {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern(pattern.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Params) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    pub fn evaluate(&self, params: &Params) -> std::result::Result<String, String> {
        match self {
            Self::Pattern(pattern) => render(pattern, params)
                .map_err(|missing| format!("'{}' needs parameter '{}'", pattern, missing)),
            Self::Computed(f) => f(params),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(pattern).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for Rule {
    fn from(pattern: &str) -> Self {
        Self::pattern(pattern)
    }
}

impl From<String> for Rule {
    fn from(pattern: String) -> Self {
        Self::Pattern(pattern)
    }
}

/// Naming rule for one output file plus its staging flags.
#[derive(Debug, Clone)]
pub struct OutputRole {
    pub rule: Rule,
    pub stage_out: bool,
    pub register_replica: bool,
}

impl OutputRole {
    pub fn new(rule: impl Into<Rule>) -> Self {
        Self {
            rule: rule.into(),
            stage_out: true,
            register_replica: true,
        }
    }

    /// Output staged out but not registered in the replica catalog.
    pub fn unregistered(rule: impl Into<Rule>) -> Self {
        Self {
            register_replica: false,
            ..Self::new(rule)
        }
    }
}

/// Executable entry of the transformation catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Execution site the job is submitted to
    pub site: String,

    /// Physical file name of the executable (path or URL)
    pub pfn: String,

    #[serde(default = "default_stageable")]
    pub is_stageable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<Arch>,

    /// Name of the container the executable runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

fn default_stageable() -> bool {
    true
}

impl Transformation {
    /// Creates a stageable transformation.
    pub fn new(name: impl Into<String>, site: impl Into<String>, pfn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            site: site.into(),
            pfn: pfn.into(),
            is_stageable: true,
            arch: None,
            container: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}

/// A reusable job definition.
///
/// # Example
///
/// ```
/// use ehtflow::workflow::template::{JobTemplate, Transformation};
///
/// let template = JobTemplate::new(Transformation::new("stage1", "condorpool", "/scripts/stage1.sh"))
///     .with_args(["-i", "{stem}.dat"])
///     .with_input("{stem}.dat")
///     .with_output("{stem}.out");
/// assert_eq!(template.name(), "stage1");
/// ```
#[derive(Debug, Clone)]
pub struct JobTemplate {
    pub transformation: Transformation,
    pub arguments: Vec<Rule>,
    pub inputs: Vec<Rule>,
    pub outputs: Vec<OutputRole>,
}

impl JobTemplate {
    pub fn new(transformation: Transformation) -> Self {
        Self {
            transformation,
            arguments: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.transformation.name
    }

    pub fn with_arg(mut self, rule: impl Into<Rule>) -> Self {
        self.arguments.push(rule.into());
        self
    }

    pub fn with_args<I, R>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        self.arguments.extend(rules.into_iter().map(Into::into));
        self
    }

    pub fn with_input(mut self, rule: impl Into<Rule>) -> Self {
        self.inputs.push(rule.into());
        self
    }

    pub fn with_output(mut self, rule: impl Into<Rule>) -> Self {
        self.outputs.push(OutputRole::new(rule));
        self
    }

    pub fn with_output_role(mut self, role: OutputRole) -> Self {
        self.outputs.push(role);
        self
    }

    fn evaluate_name(&self, rule: &Rule, params: &Params) -> Result<ArtifactName> {
        let name = rule
            .evaluate(params)
            .map_err(|reason| GraphError::role(self.name(), reason))?;
        ArtifactName::new(name).map_err(|reason| GraphError::role(self.name(), reason))
    }
}

/// Registry of job templates keyed by name.
///
/// Templates cannot be replaced or modified once registered.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<JobTemplate>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template under its name.
    pub fn register(&mut self, template: JobTemplate) -> Result<()> {
        if self.contains(template.name()) {
            return Err(GraphError::DuplicateTemplate(template.name().to_string()));
        }
        debug!("Registered template '{}'", template.name());
        self.templates.push(template);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&JobTemplate> {
        self.templates.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Templates in registration order.
    pub fn templates(&self) -> impl Iterator<Item = &JobTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Binds the named template to `params`, producing job instance `id` of `stage`.
    ///
    /// Fails with [`GraphError::UnknownTemplate`] if nothing is registered under
    /// `name`, and with [`GraphError::RoleEvaluation`] if an argument or file
    /// naming rule cannot be evaluated or yields an invalid artifact name.
    pub fn instantiate(
        &self,
        name: &str,
        id: impl Into<String>,
        stage: impl Into<String>,
        params: Params,
    ) -> Result<JobInstance> {
        let template = self
            .get(name)
            .ok_or_else(|| GraphError::UnknownTemplate(name.to_string()))?;

        let arguments = template
            .arguments
            .iter()
            .map(|rule| {
                rule.evaluate(&params)
                    .map_err(|reason| GraphError::role(name, reason))
            })
            .collect::<Result<Vec<_>>>()?;

        let inputs = template
            .inputs
            .iter()
            .map(|rule| template.evaluate_name(rule, &params))
            .collect::<Result<Vec<_>>>()?;

        let outputs = template
            .outputs
            .iter()
            .map(|role| {
                Ok(DeclaredOutput {
                    name: template.evaluate_name(&role.rule, &params)?,
                    stage_out: role.stage_out,
                    register_replica: role.register_replica,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(JobInstance::new(
            id,
            stage,
            name,
            params,
            arguments,
            inputs,
            outputs,
        ))
    }
}
