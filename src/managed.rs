//! Managed parameters: values injected by the framework instead of the caller.
//!
//! Classification happens twice per action, once while the schemas are built
//! and once again while arguments are bound. Both go through [`classify`].

use std::collections::HashMap;

use anyhow::anyhow;
use serde::Serialize;
use serde_json::Value;

use crate::action::descriptor::ParameterSpec;
use crate::error::DiscoveryError;
use crate::types::TypeRef;

/// The closed set of framework-injected parameter kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ManagedKind {
    Secret,
    OAuth2Secret {
        provider: String,
        scopes: Vec<String>,
    },
    DataSource,
}

impl ManagedKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ManagedKind::Secret => "Secret",
            ManagedKind::OAuth2Secret { .. } => "OAuth2Secret",
            ManagedKind::DataSource => "DataSource",
        }
    }
}

/// Decides whether a parameter is managed, and of which kind.
///
/// `Ok(None)` means a user parameter. A malformed `OAuth2Secret` annotation
/// is a discovery error naming the parameter and the action.
pub fn classify(
    action: &str,
    file: &str,
    param: &str,
    declared: Option<&TypeRef>,
) -> Result<Option<ManagedKind>, DiscoveryError> {
    let kind = match declared {
        Some(TypeRef::Secret) => ManagedKind::Secret,
        Some(TypeRef::DataSource) => ManagedKind::DataSource,
        Some(TypeRef::OAuth2Secret(args)) => {
            let invalid = |reason: &str| DiscoveryError::InvalidOAuth2Annotation {
                action: action.to_string(),
                param: param.to_string(),
                file: file.to_string(),
                reason: reason.to_string(),
            };
            let (provider, scopes) = provider_and_scopes(args).map_err(invalid)?;
            ManagedKind::OAuth2Secret { provider, scopes }
        }
        _ => return Ok(None),
    };
    Ok(Some(kind))
}

fn provider_and_scopes(args: &[TypeRef]) -> Result<(String, Vec<String>), &'static str> {
    let [provider, scopes] = args else {
        return Err("it must have exactly 2 type arguments");
    };
    let TypeRef::Literal(provider_values) = provider else {
        return Err("first parameter is not a Literal");
    };
    let TypeRef::List(scope_item) = scopes else {
        return Err("second parameter is not a list");
    };
    let [provider_value] = provider_values.as_slice() else {
        return Err("first parameter does not have a single provider argument");
    };
    let Value::String(provider) = provider_value else {
        return Err("first parameter Literal does not have a string");
    };
    let TypeRef::Literal(scope_values) = scope_item.as_ref() else {
        return Err("second parameter is not a list with a single Literal");
    };

    let scopes = scope_values
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or("second parameter is not a list with a literal with strings")?;

    Ok((provider.clone(), scopes))
}

/// Supplies concrete values for managed parameters at call time.
///
/// Credential stores and data-source resolvers implement this; the engine
/// only carries the metadata from the declaration.
pub trait ManagedValues: Send + Sync {
    fn resolve(&self, action: &str, param: &ParameterSpec) -> anyhow::Result<Value>;
}

/// Map-backed provider keyed by parameter name.
#[derive(Debug, Default, Clone)]
pub struct StaticManagedValues {
    values: HashMap<String, Value>,
}

impl StaticManagedValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<HashMap<String, String>> for StaticManagedValues {
    fn from(values: HashMap<String, String>) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        }
    }
}

impl ManagedValues for StaticManagedValues {
    fn resolve(&self, action: &str, param: &ParameterSpec) -> anyhow::Result<Value> {
        self.values.get(&param.name).cloned().ok_or_else(|| {
            anyhow!(
                "no {} configured for '{}' (action '{action}')",
                param
                    .managed
                    .as_ref()
                    .map(ManagedKind::type_name)
                    .unwrap_or("value"),
                param.name
            )
        })
    }
}
