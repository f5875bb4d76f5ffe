//! The durable record of one discovered action and of its last run.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ActionDeclaration, ActionFn, ActionOptions};
use crate::docs::DocBlock;
use crate::error::{BindingError, DiscoveryError};
use crate::managed::{self, ManagedKind};
use crate::schema;
use crate::types::TypeRef;

/// Outcome of the last invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NotRun,
    /// Only observable while the callable executes.
    Running,
    Pass,
    Fail,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotRun => "NOT_RUN",
            Status::Running => "RUNNING",
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an action was declared. Diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File \"{}\", line {}", self.file, self.line)
    }
}

/// Captured error information of a failed run.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureDetail {
    /// Outermost error first.
    pub chain: Vec<String>,
    /// Fully formatted trace, backtrace included when one was captured.
    pub trace: String,
}

impl FailureDetail {
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            chain: err.chain().map(ToString::to_string).collect(),
            trace: format!("{err:?}"),
        }
    }

    pub fn from_panic(message: &str) -> Self {
        Self {
            chain: vec![format!("action panicked: {message}")],
            trace: format!("action panicked: {message}"),
        }
    }

    pub fn from_binding(err: &BindingError) -> Self {
        Self {
            chain: vec![err.to_string()],
            trace: format!("BindingError: {err}"),
        }
    }
}

/// A parameter after classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    /// `None` when the parameter was declared without a type.
    pub declared_type: Option<TypeRef>,
    pub managed: Option<ManagedKind>,
    pub default: Option<Value>,
}

impl ParameterSpec {
    pub fn is_managed(&self) -> bool {
        self.managed.is_some()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn provider_id(&self) -> Option<&str> {
        match &self.managed {
            Some(ManagedKind::OAuth2Secret { provider, .. }) => Some(provider),
            _ => None,
        }
    }

    pub fn required_scopes(&self) -> Option<&[String]> {
        match &self.managed {
            Some(ManagedKind::OAuth2Secret { scopes, .. }) => Some(scopes),
            _ => None,
        }
    }
}

/// One discovered action: its callable, derived schemas and last run state.
///
/// Created once at discovery, mutated only by the invoker. A new invocation
/// overwrites the previous outcome.
pub struct ActionDescriptor {
    name: String,
    module: String,
    location: SourceLocation,
    callable: Box<dyn ActionFn>,
    options: ActionOptions,
    parameters: Vec<ParameterSpec>,
    returns: Option<TypeRef>,
    doc: DocBlock,
    input_schema: Value,
    output_schema: Value,
    managed_params_schema: Value,

    pub(crate) status: Status,
    pub(crate) message: String,
    pub(crate) failure: Option<FailureDetail>,
    pub(crate) result: Option<Value>,
    pub(crate) run_id: Option<Uuid>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
}

impl ActionDescriptor {
    /// Classifies the parameters and synthesizes every schema.
    ///
    /// Any schema problem fails here, before a caller can reach the action.
    pub fn discover(declaration: ActionDeclaration) -> Result<Self, DiscoveryError> {
        let ActionDeclaration {
            name,
            module,
            location,
            callable,
            options,
            params,
            returns,
            doc,
        } = declaration;

        let mut seen = HashSet::new();
        let mut parameters = Vec::with_capacity(params.len());
        for param in params {
            if !seen.insert(param.name.clone()) {
                return Err(DiscoveryError::DuplicateParameter {
                    action: name,
                    param: param.name,
                });
            }
            let managed = managed::classify(
                &name,
                &location.file,
                &param.name,
                param.declared_type.as_ref(),
            )?;
            let default = match param.default {
                Some(Ok(value)) => Some(value),
                Some(Err(source)) => {
                    return Err(DiscoveryError::InvalidDefault {
                        action: name,
                        param: param.name,
                        source,
                    })
                }
                None => None,
            };
            parameters.push(ParameterSpec {
                name: param.name,
                declared_type: param.declared_type,
                managed,
                default,
            });
        }

        let doc = DocBlock::parse(&doc);
        let input_schema = schema::build_input_schema(&name, &parameters, &doc)?;
        let output_schema = schema::build_output_schema(&name, returns.as_ref(), &doc)?;
        let managed_params_schema = schema::build_managed_schema(&parameters, &doc);

        let managed_count = parameters.iter().filter(|p| p.is_managed()).count();
        info!(
            "Discovered action '{name}' ({location}): {} parameters, {managed_count} managed",
            parameters.len()
        );
        debug!("Input schema of '{name}': {input_schema}");

        Ok(Self {
            name,
            module,
            location,
            callable,
            options,
            parameters,
            returns,
            doc,
            input_schema,
            output_schema,
            managed_params_schema,
            status: Status::NotRun,
            message: String::new(),
            failure: None,
            result: None,
            run_id: None,
            started_at: None,
            finished_at: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// `module.name`, or just `name` for actions outside any module.
    pub fn qualified_name(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub(crate) fn callable(&self) -> &dyn ActionFn {
        self.callable.as_ref()
    }

    pub fn options(&self) -> &ActionOptions {
        &self.options
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn return_type(&self) -> Option<&TypeRef> {
        self.returns.as_ref()
    }

    pub fn doc(&self) -> &DocBlock {
        &self.doc
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn output_schema(&self) -> &Value {
        &self.output_schema
    }

    pub fn managed_params_schema(&self) -> &Value {
        &self.managed_params_schema
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn failed(&self) -> bool {
        self.status == Status::Fail
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn failure(&self) -> Option<&FailureDetail> {
        self.failure.as_ref()
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Wall-clock duration of the last run, once it has finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("location", &self.location)
            .field("status", &self.status)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({}, status: {})", self.name, self.status)
    }
}
