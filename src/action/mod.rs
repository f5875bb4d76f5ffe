pub mod descriptor;
pub mod registry;

use std::future::Future;
use std::panic::Location;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Reflect, TypeRef};

pub use descriptor::{ActionDescriptor, FailureDetail, ParameterSpec, SourceLocation, Status};
pub use registry::ActionRegistry;

/// Arguments handed to an action body: caller-supplied values, defaults of
/// omitted parameters and injected managed values, all keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Map<String, Value>,
}

impl Arguments {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Deserializes one argument into its native type.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| anyhow!("Missing argument: {name}"))?;
        serde_json::from_value(value.clone()).with_context(|| format!("Invalid argument: {name}"))
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

/// The callable behind an action.
///
/// Closures `Fn(Arguments) -> impl Future<Output = anyhow::Result<Value>>`
/// implement it directly.
#[async_trait]
pub trait ActionFn: Send + Sync {
    /// Runs the action body. An `Err` becomes a `FAIL` status; it is never
    /// propagated past the invoker.
    async fn call(&self, args: Arguments) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> ActionFn for F
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn call(&self, args: Arguments) -> anyhow::Result<Value> {
        (self)(args).await
    }
}

/// Configuration captured at declaration time and forwarded untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOptions {
    /// Whether running the action has side effects the user should confirm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_consequential: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// One declared parameter of an action.
pub struct ParamDecl {
    pub(crate) name: String,
    pub(crate) declared_type: Option<TypeRef>,
    pub(crate) default: Option<Result<Value, serde_json::Error>>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, declared_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            declared_type: Some(declared_type),
            default: None,
        }
    }

    /// A parameter with the declared type of a native Rust type.
    pub fn of<T: Reflect>(name: impl Into<String>) -> Self {
        Self::new(name, T::type_ref())
    }

    /// A parameter without a type annotation (treated as a string).
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: None,
            default: None,
        }
    }

    /// Sets the default, converted to plain data the same way results are.
    pub fn default(mut self, value: impl Serialize) -> Self {
        self.default = Some(serde_json::to_value(value));
        self
    }
}

/// The reflection record of an action, built once at discovery time.
///
/// The engine works on this record only, never on the callable internals.
pub struct ActionDeclaration {
    pub(crate) name: String,
    pub(crate) module: String,
    pub(crate) location: SourceLocation,
    pub(crate) callable: Box<dyn ActionFn>,
    pub(crate) options: ActionOptions,
    pub(crate) params: Vec<ParamDecl>,
    pub(crate) returns: Option<TypeRef>,
    pub(crate) doc: String,
}

impl ActionDeclaration {
    /// Declares an action. The source location defaults to the caller.
    #[track_caller]
    pub fn new(name: impl Into<String>, callable: impl ActionFn + 'static) -> Self {
        let caller = Location::caller();
        Self {
            name: name.into(),
            module: String::new(),
            location: SourceLocation::new(caller.file(), caller.line()),
            callable: Box::new(callable),
            options: ActionOptions::default(),
            params: Vec::new(),
            returns: None,
            doc: String::new(),
        }
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.location = SourceLocation::new(file, line);
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, returns: TypeRef) -> Self {
        self.returns = Some(returns);
        self
    }

    pub fn options(mut self, options: ActionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
