//! Action introspection and execution engine.
//!
//! Plain async functions are declared once with their parameters, return
//! type and doc block. Discovery turns each declaration into an
//! [`ActionDescriptor`] carrying reference-free input/output JSON schemas and
//! the metadata of framework-managed parameters. [`invoke`] binds loosely
//! typed arguments, runs the action between before/after lifecycle hooks and
//! settles the outcome into the descriptor.

pub mod action;
pub mod builtin;
pub mod config;
pub mod docs;
pub mod error;
pub mod hooks;
pub mod invoker;
pub mod managed;
pub mod report;
pub mod schema;
pub mod types;

pub use action::{
    ActionDeclaration, ActionDescriptor, ActionFn, ActionOptions, ActionRegistry, Arguments,
    ParamDecl, Status,
};
pub use error::{BindingError, DiscoveryError, ReportError, ReportWarning};
pub use hooks::{HookRegistration, LifecycleHooks};
pub use invoker::{current_action, invoke, ExecutionContext, InvokeError, RunOutcome};
pub use managed::{ManagedKind, ManagedValues, StaticManagedValues};
pub use report::ResultReporter;
pub use types::{Reflect, StructuredType, TypeRef};
