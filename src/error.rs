//! Error kinds raised by the engine.
//!
//! Discovery and binding errors go back to the immediate caller with enough
//! context to fix the declaration. Execution errors never show up here: they
//! are settled into the descriptor state by the invoker.

/// An action could not be registered.
///
/// Fatal to that one action only; discovery of the others continues.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The declared type is neither a supported primitive nor adaptable to a
    /// structured schema.
    #[error(
        "it was not possible to create the schema for '{param}' in '{action}' (type: {type_name}). \
         Supported {kind} types: string, integer, number, boolean, lists/maps/optionals of those \
         or structured types"
    )]
    UnsupportedType {
        action: String,
        param: String,
        type_name: String,
        kind: &'static str,
    },

    /// An `OAuth2Secret` parameter whose type arguments are malformed.
    #[error(
        "invalid OAuth2Secret annotation for parameter '{param}' of action '{action}' ({file}): {reason}.\n\
         An OAuth2Secret must be parametrized with 2 arguments: a literal with the provider name \
         (i.e. Literal[\"google\"]) and a list with one literal holding the required scopes \
         (i.e. list[Literal[\"scope1\", \"scope2\"]])"
    )]
    InvalidOAuth2Annotation {
        action: String,
        param: String,
        file: String,
        reason: String,
    },

    /// A default value could not be converted into plain data.
    #[error("default value of '{param}' in '{action}' cannot be represented as JSON: {source}")]
    InvalidDefault {
        action: String,
        param: String,
        #[source]
        source: serde_json::Error,
    },

    /// A structured schema kept a reference that could not be inlined.
    #[error("schema of '{param}' in '{action}' has an unresolvable reference: {reference}")]
    UnresolvedReference {
        action: String,
        param: String,
        reference: String,
    },

    /// Two parameters share a name.
    #[error("action '{action}' declares parameter '{param}' more than once")]
    DuplicateParameter { action: String, param: String },

    /// The (module, name) pair is already registered.
    #[error("action '{action}' is already registered in module '{module}'")]
    DuplicateAction { module: String, action: String },
}

/// Caller-supplied arguments do not match the action signature.
///
/// The callable is never invoked when this is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindingError {
    #[error("got an unexpected keyword argument '{name}'")]
    UnexpectedArgument { name: String },

    #[error("missing a required argument: '{name}'")]
    MissingArgument { name: String },

    #[error("invalid value for argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// The managed-value provider could not supply a framework-injected value.
    #[error("no value available for managed parameter '{name}': {reason}")]
    ManagedValueUnavailable { name: String, reason: String },

    /// Discovery and binding classified a parameter differently.
    #[error("internal error: parameter '{name}' was classified differently at discovery and binding time")]
    Inconsistent { name: String },
}

/// Failure of the reporting path itself (not of the action).
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("the resulting value: {result} cannot be converted to JSON: {source}")]
    Unserializable {
        result: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to write result to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Non-fatal diagnostics raised after a run has already settled.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportWarning {
    /// The returned value does not match the declared return type.
    ReturnTypeMismatch {
        action: String,
        actual: String,
        expected: String,
        location: String,
        detail: String,
    },
    /// No return type was declared, so nothing could be validated.
    MissingReturnAnnotation { action: String },
}

impl std::fmt::Display for ReportWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportWarning::ReturnTypeMismatch {
                action,
                actual,
                expected,
                location,
                detail,
            } => write!(
                f,
                "Although the action: '{action}' ran properly, it returned a value of type \
                 {actual} whereas the expected return type is {expected}.\n\
                 Action location:\n  {location}\n\
                 Validation error: {detail}"
            ),
            ReportWarning::MissingReturnAnnotation { action } => write!(
                f,
                "Note: Unable to validate return type of '{action}' \
                 (no return type annotation found in its declaration)."
            ),
        }
    }
}
