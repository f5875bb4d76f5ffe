//! Runs one action: bind, before-run hooks, execute, after-run hooks.
//!
//! Execution errors and panics never escape [`invoke`]; they are settled into
//! the descriptor so hooks and outer dispatch loops always observe a terminal
//! status. Only a binding failure is returned as an error, and even then the
//! descriptor is settled to `FAIL` first and the after-run hooks still fire.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::action::{ActionDescriptor, Arguments, FailureDetail, Status};
use crate::error::BindingError;
use crate::hooks::{panic_message, HookFailure, HookPhase, LifecycleHooks};
use crate::managed::{self, ManagedValues};

/// Everything an invocation needs besides the descriptor and the arguments.
#[derive(Clone)]
pub struct ExecutionContext {
    hooks: LifecycleHooks,
    managed: Option<Arc<dyn ManagedValues>>,
}

impl ExecutionContext {
    pub fn new(hooks: LifecycleHooks) -> Self {
        Self {
            hooks,
            managed: None,
        }
    }

    /// Supplies the values of managed parameters.
    pub fn with_managed(mut self, managed: Arc<dyn ManagedValues>) -> Self {
        self.managed = Some(managed);
        self
    }

    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }
}

impl Default for ExecutionContext {
    /// Uses the process-wide hook lists.
    fn default() -> Self {
        Self::new(LifecycleHooks::global().clone())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("hooks", &self.hooks)
            .field("managed", &self.managed.is_some())
            .finish()
    }
}

/// Terminal state of one invocation, as also recorded on the descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: Status,
    pub result: Option<Value>,
    pub message: String,
    /// Hooks that failed. These never change `status`.
    pub hook_failures: Vec<HookFailure>,
}

/// Arguments did not match the signature, so the callable never ran.
///
/// After-run hooks still fired; their failures travel with the binding error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{binding}")]
pub struct InvokeError {
    pub binding: BindingError,
    pub hook_failures: Vec<HookFailure>,
}

/// The action whose callable is executing on the current task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentAction {
    pub name: String,
    pub run_id: Uuid,
}

tokio::task_local! {
    static CURRENT_ACTION: CurrentAction;
}

/// Name and run id of the running action.
///
/// Only `Some` inside the callable of an invocation (and code it awaits on
/// the same task).
pub fn current_action() -> Option<CurrentAction> {
    CURRENT_ACTION.try_with(Clone::clone).ok()
}

/// Invokes `descriptor` with caller-supplied arguments.
pub async fn invoke(
    descriptor: &mut ActionDescriptor,
    args: Map<String, Value>,
    ctx: &ExecutionContext,
) -> Result<RunOutcome, InvokeError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("action", name = %descriptor.name(), %run_id);
    run(descriptor, args, ctx, run_id).instrument(span).await
}

async fn run(
    descriptor: &mut ActionDescriptor,
    args: Map<String, Value>,
    ctx: &ExecutionContext,
    run_id: Uuid,
) -> Result<RunOutcome, InvokeError> {
    descriptor.status = Status::NotRun;
    descriptor.message.clear();
    descriptor.failure = None;
    descriptor.result = None;
    descriptor.run_id = Some(run_id);
    descriptor.started_at = Some(Utc::now());
    descriptor.finished_at = None;

    let arguments = match bind(descriptor, args, ctx.managed.as_deref()) {
        Ok(arguments) => arguments,
        Err(err) => {
            warn!("Not running '{}': {err}", descriptor.name());
            descriptor.status = Status::Fail;
            descriptor.message = format!(
                "Unable to call action '{}': arguments do not match its signature: {err}",
                descriptor.name()
            );
            descriptor.failure = Some(FailureDetail::from_binding(&err));
            descriptor.finished_at = Some(Utc::now());
            let hook_failures = ctx.hooks.fire(HookPhase::AfterRun, descriptor);
            return Err(InvokeError {
                binding: err,
                hook_failures,
            });
        }
    };

    descriptor.status = Status::Running;
    let mut hook_failures = ctx.hooks.fire(HookPhase::BeforeRun, descriptor);

    debug!("Calling '{}' with {} arguments", descriptor.name(), arguments.len());
    let current = CurrentAction {
        name: descriptor.name().to_string(),
        run_id,
    };
    let outcome = CURRENT_ACTION
        .scope(
            current,
            AssertUnwindSafe(descriptor.callable().call(arguments)).catch_unwind(),
        )
        .await;

    match outcome {
        Ok(Ok(value)) => {
            descriptor.status = Status::Pass;
            descriptor.result = Some(value);
        }
        Ok(Err(err)) => {
            error!("Action '{}' failed: {err:#}", descriptor.name());
            descriptor.status = Status::Fail;
            descriptor.message = format!("{err:#}");
            descriptor.failure = Some(FailureDetail::from_error(&err));
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Action '{}' panicked: {message}", descriptor.name());
            descriptor.status = Status::Fail;
            descriptor.message = format!("action panicked: {message}");
            descriptor.failure = Some(FailureDetail::from_panic(&message));
        }
    }
    descriptor.finished_at = Some(Utc::now());
    info!(
        "Action '{}' finished with status {}",
        descriptor.name(),
        descriptor.status()
    );

    hook_failures.extend(ctx.hooks.fire(HookPhase::AfterRun, descriptor));

    Ok(RunOutcome {
        status: descriptor.status,
        result: descriptor.result.clone(),
        message: descriptor.message.clone(),
        hook_failures,
    })
}

/// Binds caller arguments to the declared parameters.
///
/// Managed names are not caller-visible: passing one is an unexpected
/// argument. Defaults fill omitted user parameters and managed values come
/// from `managed`.
fn bind(
    descriptor: &ActionDescriptor,
    mut args: Map<String, Value>,
    managed: Option<&dyn ManagedValues>,
) -> Result<Arguments, BindingError> {
    let params = descriptor.parameters();

    for param in params {
        let kind = managed::classify(
            descriptor.name(),
            &descriptor.location().file,
            &param.name,
            param.declared_type.as_ref(),
        )
        .map_err(|_| BindingError::Inconsistent {
            name: param.name.clone(),
        })?;
        if kind != param.managed {
            return Err(BindingError::Inconsistent {
                name: param.name.clone(),
            });
        }
    }

    if let Some(name) = args
        .keys()
        .find(|name| !params.iter().any(|p| !p.is_managed() && &p.name == *name))
    {
        return Err(BindingError::UnexpectedArgument { name: name.clone() });
    }

    let mut bound = Map::new();
    for param in params.iter().filter(|p| !p.is_managed()) {
        let value = match args.remove(&param.name) {
            Some(value) => {
                if let Some(declared) = &param.declared_type {
                    declared
                        .check(&value)
                        .map_err(|reason| BindingError::InvalidArgument {
                            name: param.name.clone(),
                            reason,
                        })?;
                }
                value
            }
            None => match &param.default {
                Some(default) => default.clone(),
                None => {
                    return Err(BindingError::MissingArgument {
                        name: param.name.clone(),
                    })
                }
            },
        };
        bound.insert(param.name.clone(), value);
    }

    for param in params.iter().filter(|p| p.is_managed()) {
        let unavailable = |reason: String| BindingError::ManagedValueUnavailable {
            name: param.name.clone(),
            reason,
        };
        let provider =
            managed.ok_or_else(|| unavailable("no managed value provider configured".into()))?;
        let value = provider
            .resolve(descriptor.name(), param)
            .map_err(|e| unavailable(format!("{e:#}")))?;
        bound.insert(param.name.clone(), value);
    }

    Ok(Arguments::new(bound))
}
