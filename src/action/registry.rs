use serde_json::{json, Value};
use tracing::{info, warn};

use super::{ActionDeclaration, ActionDescriptor};
use crate::error::DiscoveryError;

/// Discovered actions, in registration order.
///
/// Names are unique within their declaring module. Lookups accept either
/// the bare name or `module.name`.
#[derive(Default)]
pub struct ActionRegistry {
    actions: Vec<ActionDescriptor>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs discovery for one declaration and keeps the resulting descriptor.
    pub fn register(
        &mut self,
        declaration: ActionDeclaration,
    ) -> Result<&ActionDescriptor, DiscoveryError> {
        if self
            .actions
            .iter()
            .any(|a| a.module() == declaration.module && a.name() == declaration.name)
        {
            return Err(DiscoveryError::DuplicateAction {
                module: declaration.module,
                action: declaration.name,
            });
        }
        let descriptor = ActionDescriptor::discover(declaration)?;
        self.actions.push(descriptor);
        Ok(&self.actions[self.actions.len() - 1])
    }

    /// Registers every valid declaration; returns the errors of the others.
    pub fn discover(
        &mut self,
        declarations: impl IntoIterator<Item = ActionDeclaration>,
    ) -> Vec<DiscoveryError> {
        let mut errors = Vec::new();
        for declaration in declarations {
            let name = declaration.name.clone();
            if let Err(e) = self.register(declaration) {
                warn!("Skipping action '{name}': {e}");
                errors.push(e);
            }
        }
        info!(
            "Discovery finished: {} actions registered, {} rejected",
            self.actions.len(),
            errors.len()
        );
        errors
    }

    pub fn find(&self, name: &str) -> Option<&ActionDescriptor> {
        self.position(name).map(|i| &self.actions[i])
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut ActionDescriptor> {
        self.position(name).map(|i| &mut self.actions[i])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.actions
            .iter()
            .position(|a| a.qualified_name() == name)
            .or_else(|| self.actions.iter().position(|a| a.name() == name))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.actions.iter()
    }

    /// Aggregate, reference-free description of every registered action,
    /// meant to be embedded in a larger API document.
    pub fn metadata(&self) -> Value {
        let actions: Vec<Value> = self
            .actions
            .iter()
            .map(|a| {
                json!({
                    "name": a.name(),
                    "module": a.module(),
                    "file": a.location().file,
                    "line": a.location().line,
                    "description": a.doc().summary,
                    "options": a.options(),
                    "input_schema": a.input_schema(),
                    "output_schema": a.output_schema(),
                    "managed_params": a.managed_params_schema(),
                })
            })
            .collect();
        json!({ "actions": actions })
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("count", &self.actions.len())
            .field(
                "names",
                &self.actions.iter().map(|a| a.qualified_name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
