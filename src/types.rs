//! Declared-type vocabulary of an action signature.
//!
//! Rust has no runtime reflection, so every parameter and return type is
//! described by a [`TypeRef`], either spelled out through the builder API or
//! derived at compile time through [`Reflect`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A type exposing a schema-generation capability and a structural validator.
///
/// Generation goes through `schemars`, validation through `serde`
/// deserialization into the concrete type.
#[derive(Clone)]
pub struct StructuredType {
    name: String,
    generate: fn() -> RootSchema,
    validate: fn(&Value) -> Result<(), String>,
}

fn generate_for<T: JsonSchema>() -> RootSchema {
    schemars::schema_for!(T)
}

fn validate_as<T: DeserializeOwned>(value: &Value) -> Result<(), String> {
    serde_json::from_value::<T>(value.clone())
        .map(|_| ())
        .map_err(|e| e.to_string())
}

impl StructuredType {
    pub fn of<T: JsonSchema + DeserializeOwned>() -> Self {
        Self {
            name: T::schema_name(),
            generate: generate_for::<T>,
            validate: validate_as::<T>,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw generated schema, definitions table and references included.
    pub fn raw_schema(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value((self.generate)())
    }

    pub fn validate(&self, value: &Value) -> Result<(), String> {
        (self.validate)(value)
    }
}

impl fmt::Debug for StructuredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredType")
            .field("name", &self.name)
            .finish()
    }
}

impl PartialEq for StructuredType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// The declared type of a parameter or of a return value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    String,
    Integer,
    Number,
    Boolean,
    /// One of a fixed set of literal values.
    Literal(Vec<Value>),
    List(Box<TypeRef>),
    Optional(Box<TypeRef>),
    /// String-keyed map.
    Map(Box<TypeRef>),
    Structured(StructuredType),
    /// A plain secret, injected by the framework.
    Secret,
    /// An OAuth2 credential handle. Carries its raw type arguments; they are
    /// checked during discovery, not at construction.
    OAuth2Secret(Vec<TypeRef>),
    /// A data-source handle, injected by the framework.
    DataSource,
    /// A type the engine knows nothing about.
    Opaque(String),
}

impl TypeRef {
    pub fn of<T: Reflect>() -> Self {
        T::type_ref()
    }

    pub fn structured<T: JsonSchema + DeserializeOwned>() -> Self {
        TypeRef::Structured(StructuredType::of::<T>())
    }

    pub fn list(item: TypeRef) -> Self {
        TypeRef::List(Box::new(item))
    }

    pub fn optional(inner: TypeRef) -> Self {
        TypeRef::Optional(Box::new(inner))
    }

    pub fn map(value: TypeRef) -> Self {
        TypeRef::Map(Box::new(value))
    }

    pub fn literal<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        TypeRef::Literal(values.into_iter().map(Into::into).collect())
    }

    pub fn opaque(name: impl Into<String>) -> Self {
        TypeRef::Opaque(name.into())
    }

    /// A well-formed `OAuth2Secret[Literal[provider], list[Literal[scopes...]]]`.
    pub fn oauth2_secret<I, S>(provider: &str, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes: Vec<Value> = scopes.into_iter().map(|s| Value::String(s.into())).collect();
        TypeRef::OAuth2Secret(vec![
            TypeRef::literal([provider]),
            TypeRef::list(TypeRef::Literal(scopes)),
        ])
    }

    /// Canonical schema-type name for the four supported primitives.
    pub fn schema_type_name(&self) -> Option<&'static str> {
        match self {
            TypeRef::String => Some("string"),
            TypeRef::Integer => Some("integer"),
            TypeRef::Number => Some("number"),
            TypeRef::Boolean => Some("boolean"),
            _ => None,
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(
            self,
            TypeRef::Secret | TypeRef::OAuth2Secret(_) | TypeRef::DataSource
        )
    }

    /// Runtime type-membership check of a loosely-typed value.
    ///
    /// Primitives and containers are checked shallowly here; structured types
    /// delegate to their own validator.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        let mismatch = || Err(format!("expected {self}, got {}", json_kind(value)));
        match self {
            TypeRef::String if value.is_string() => Ok(()),
            TypeRef::Integer if value.is_i64() || value.is_u64() => Ok(()),
            TypeRef::Number if value.is_number() => Ok(()),
            TypeRef::Boolean if value.is_boolean() => Ok(()),
            TypeRef::Literal(allowed) => {
                if allowed.contains(value) {
                    Ok(())
                } else {
                    Err(format!("{value} is not one of {self}"))
                }
            }
            TypeRef::List(item) => match value.as_array() {
                Some(items) => items.iter().enumerate().try_for_each(|(i, v)| {
                    item.check(v).map_err(|e| format!("item {i}: {e}"))
                }),
                None => mismatch(),
            },
            TypeRef::Optional(_) if value.is_null() => Ok(()),
            TypeRef::Optional(inner) => inner.check(value),
            TypeRef::Map(inner) => match value.as_object() {
                Some(entries) => entries.iter().try_for_each(|(k, v)| {
                    inner.check(v).map_err(|e| format!("key '{k}': {e}"))
                }),
                None => mismatch(),
            },
            TypeRef::Structured(structured) => structured.validate(value),
            TypeRef::Secret | TypeRef::OAuth2Secret(_) | TypeRef::DataSource => {
                Err(format!("{self} values are supplied by the framework"))
            }
            TypeRef::Opaque(name) => Err(format!("values of type {name} cannot be checked")),
            _ => mismatch(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::String => f.write_str("string"),
            TypeRef::Integer => f.write_str("integer"),
            TypeRef::Number => f.write_str("number"),
            TypeRef::Boolean => f.write_str("boolean"),
            TypeRef::Literal(values) => {
                let parts: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "Literal[{}]", parts.join(", "))
            }
            TypeRef::List(item) => write!(f, "list[{item}]"),
            TypeRef::Optional(inner) => write!(f, "Optional[{inner}]"),
            TypeRef::Map(value) => write!(f, "dict[string, {value}]"),
            TypeRef::Structured(s) => f.write_str(s.name()),
            TypeRef::Secret => f.write_str("Secret"),
            TypeRef::OAuth2Secret(args) => {
                let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "OAuth2Secret[{}]", parts.join(", "))
            }
            TypeRef::DataSource => f.write_str("DataSource"),
            TypeRef::Opaque(name) => f.write_str(name),
        }
    }
}

/// Kind name of a JSON value, using integer/number the way schemas do.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Compile-time mapping from a native Rust type to its [`TypeRef`].
pub trait Reflect {
    fn type_ref() -> TypeRef;
}

macro_rules! reflect_as {
    ($variant:ident: $($ty:ty),+) => {
        $(impl Reflect for $ty {
            fn type_ref() -> TypeRef {
                TypeRef::$variant
            }
        })+
    };
}

reflect_as!(String: String, &str, char);
reflect_as!(Integer: i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
reflect_as!(Number: f32, f64);
reflect_as!(Boolean: bool);

impl<T: Reflect> Reflect for Vec<T> {
    fn type_ref() -> TypeRef {
        TypeRef::list(T::type_ref())
    }
}

impl<T: Reflect> Reflect for Option<T> {
    fn type_ref() -> TypeRef {
        TypeRef::optional(T::type_ref())
    }
}

impl<T: Reflect> Reflect for HashMap<String, T> {
    fn type_ref() -> TypeRef {
        TypeRef::map(T::type_ref())
    }
}

impl<T: Reflect> Reflect for BTreeMap<String, T> {
    fn type_ref() -> TypeRef {
        TypeRef::map(T::type_ref())
    }
}
