//! Input/output schema synthesis.
//!
//! Schemas are plain `serde_json::Value` trees meant to be spliced into a
//! larger API description. For that reason every named reference produced
//! by a structured type is inlined and its definition table dropped.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::action::descriptor::ParameterSpec;
use crate::docs::DocBlock;
use crate::error::DiscoveryError;
use crate::managed::ManagedKind;
use crate::types::{json_kind, StructuredType, TypeRef};

/// Name given to a return value when an adapter needs one.
const RETURN_VALUE_NAME: &str = "return_value";

const DEFINITION_PREFIXES: [&str; 2] = ["#/definitions/", "#/$defs/"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    Parameter,
    Return,
}

impl Position {
    fn as_str(self) -> &'static str {
        match self {
            Position::Parameter => "parameter",
            Position::Return => "return",
        }
    }
}

enum AdaptError {
    Unsupported,
    Unresolved(String),
}

/// Object schema of the caller-visible parameters, in declaration order.
///
/// Managed parameters are skipped entirely, defaults included.
pub fn build_input_schema(
    action: &str,
    params: &[ParameterSpec],
    doc: &DocBlock,
) -> Result<Value, DiscoveryError> {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in params.iter().filter(|p| !p.is_managed()) {
        let mut property = build_property(
            action,
            Some(&param.name),
            param.declared_type.as_ref(),
            doc.param(&param.name),
            Position::Parameter,
        )?;
        match &param.default {
            Some(default) => {
                property.insert("default".to_string(), default.clone());
            }
            None => required.push(Value::String(param.name.clone())),
        }
        properties.insert(param.name.clone(), Value::Object(property));
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    Ok(Value::Object(schema))
}

/// Schema of the single return value. No `required` concept, no title unless
/// an adapter had to name the value.
pub fn build_output_schema(
    action: &str,
    returns: Option<&TypeRef>,
    doc: &DocBlock,
) -> Result<Value, DiscoveryError> {
    build_property(action, None, returns, doc.returns(), Position::Return).map(Value::Object)
}

/// Metadata of the managed parameters, keyed by parameter name.
pub fn build_managed_schema(params: &[ParameterSpec], doc: &DocBlock) -> Value {
    let mut schema = Map::new();
    for param in params {
        let Some(kind) = &param.managed else {
            continue;
        };
        let mut entry = Map::new();
        entry.insert("type".to_string(), json!(kind.type_name()));
        let description = doc.param(&param.name);
        if !description.is_empty() {
            entry.insert("description".to_string(), json!(description));
        }
        if let ManagedKind::OAuth2Secret { provider, scopes } = kind {
            entry.insert("provider".to_string(), json!(provider));
            entry.insert("scopes".to_string(), json!(scopes));
        }
        schema.insert(param.name.clone(), Value::Object(entry));
    }
    Value::Object(schema)
}

fn build_property(
    action: &str,
    param_name: Option<&str>,
    declared: Option<&TypeRef>,
    description: &str,
    position: Position,
) -> Result<Map<String, Value>, DiscoveryError> {
    let declared = match declared {
        None => return Ok(primitive_property("string", param_name, description)),
        Some(t) => match t.schema_type_name() {
            Some(type_name) => return Ok(primitive_property(type_name, param_name, description)),
            None => t,
        },
    };

    // Structured types carry their own schema; anything else goes through
    // the raw-type adapter, which needs a name to title the result.
    let (adapted, name) = match declared {
        TypeRef::Structured(structured) => (inline_structured(structured), param_name),
        other => (adapt(other), param_name.or(Some(RETURN_VALUE_NAME))),
    };

    let shown_name = param_name.unwrap_or(RETURN_VALUE_NAME);
    let schema = adapted.map_err(|e| match e {
        AdaptError::Unsupported => DiscoveryError::UnsupportedType {
            action: action.to_string(),
            param: shown_name.to_string(),
            type_name: declared.to_string(),
            kind: position.as_str(),
        },
        AdaptError::Unresolved(reference) => DiscoveryError::UnresolvedReference {
            action: action.to_string(),
            param: shown_name.to_string(),
            reference,
        },
    })?;

    let mut property = match schema {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("allOf".to_string(), json!([other]));
            map
        }
    };
    if !description.is_empty() {
        property.insert("description".to_string(), json!(description));
    }
    if let Some(name) = name {
        if !property.contains_key("title") {
            property.insert("title".to_string(), json!(title_case(name)));
        }
    }
    debug!("Built {} schema for '{shown_name}' in '{action}'", position.as_str());
    Ok(property)
}

fn primitive_property(
    type_name: &str,
    param_name: Option<&str>,
    description: &str,
) -> Map<String, Value> {
    let mut property = Map::new();
    property.insert("type".to_string(), json!(type_name));
    property.insert("description".to_string(), json!(description));
    if let Some(name) = param_name {
        property.insert("title".to_string(), json!(title_case(name)));
    }
    property
}

/// Wraps a raw (non-primitive, non-structured) type into a schema.
fn adapt(declared: &TypeRef) -> Result<Value, AdaptError> {
    let schema = match declared {
        TypeRef::String | TypeRef::Integer | TypeRef::Number | TypeRef::Boolean => {
            json!({ "type": declared.schema_type_name() })
        }
        TypeRef::Literal(values) => {
            let mut map = Map::new();
            map.insert("enum".to_string(), Value::Array(values.clone()));
            if let Some(first) = values.first() {
                let kind = json_kind(first);
                if kind != "null" && values.iter().all(|v| json_kind(v) == kind) {
                    map.insert("type".to_string(), json!(kind));
                }
            }
            Value::Object(map)
        }
        TypeRef::List(item) => json!({ "type": "array", "items": adapt(item)? }),
        TypeRef::Optional(inner) => json!({ "anyOf": [adapt(inner)?, { "type": "null" }] }),
        TypeRef::Map(value) => json!({ "type": "object", "additionalProperties": adapt(value)? }),
        TypeRef::Structured(structured) => inline_structured(structured)?,
        TypeRef::Secret | TypeRef::OAuth2Secret(_) | TypeRef::DataSource | TypeRef::Opaque(_) => {
            return Err(AdaptError::Unsupported)
        }
    };
    Ok(schema)
}

fn inline_structured(structured: &StructuredType) -> Result<Value, AdaptError> {
    let raw = structured
        .raw_schema()
        .map_err(|_| AdaptError::Unsupported)?;
    inline_refs(raw).map_err(AdaptError::Unresolved)
}

/// Replaces every `$ref` with the referenced definition and drops the
/// definition tables. Fails with the offending reference when it is unknown
/// or recursive, since a recursive type cannot be expressed reference-free.
pub fn inline_refs(mut schema: Value) -> Result<Value, String> {
    let mut definitions = Map::new();
    if let Value::Object(root) = &mut schema {
        root.remove("$schema");
        for table in ["definitions", "$defs"] {
            if let Some(Value::Object(defs)) = root.remove(table) {
                definitions.extend(defs);
            }
        }
    }
    let mut stack = Vec::new();
    resolve(&mut schema, &definitions, &mut stack)?;
    Ok(schema)
}

fn resolve(
    node: &mut Value,
    definitions: &Map<String, Value>,
    stack: &mut Vec<String>,
) -> Result<(), String> {
    match node {
        Value::Object(map) => {
            let reference = match map.remove("$ref") {
                Some(Value::String(reference)) => Some(reference),
                Some(other) => return Err(other.to_string()),
                None => None,
            };
            for value in map.values_mut() {
                resolve(value, definitions, stack)?;
            }
            if let Some(reference) = reference {
                let name = DEFINITION_PREFIXES
                    .iter()
                    .find_map(|prefix| reference.strip_prefix(prefix))
                    .ok_or_else(|| reference.clone())?;
                if stack.iter().any(|s| s == name) {
                    return Err(format!("{reference} (recursive)"));
                }
                let mut target = definitions
                    .get(name)
                    .cloned()
                    .ok_or_else(|| reference.clone())?;
                stack.push(name.to_string());
                resolve(&mut target, definitions, stack)?;
                stack.pop();
                match target {
                    Value::Object(fields) => {
                        for (key, value) in fields {
                            map.entry(key).or_insert(value);
                        }
                    }
                    other => {
                        map.insert("allOf".to_string(), json!([other]));
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve(item, definitions, stack)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// `first_name` -> `First Name`.
pub fn title_case(name: &str) -> String {
    let mut title = String::with_capacity(name.len());
    // A letter starts a word unless it follows another letter.
    let mut in_word = false;
    for c in name.chars() {
        if c.is_alphabetic() {
            if in_word {
                title.extend(c.to_lowercase());
            } else {
                title.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            title.push(if c == '_' { ' ' } else { c });
            in_word = false;
        }
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct Address {
        street: String,
        zip: u32,
    }

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct Customer {
        name: String,
        address: Address,
        previous: Vec<Address>,
    }

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct Tree {
        children: Vec<Tree>,
    }

    fn user(name: &str, t: TypeRef) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            declared_type: Some(t),
            managed: None,
            default: None,
        }
    }

    fn contains_ref(value: &Value) -> bool {
        match value {
            Value::Object(map) => {
                map.contains_key("$ref")
                    || map.contains_key("definitions")
                    || map.contains_key("$defs")
                    || map.values().any(contains_ref)
            }
            Value::Array(items) => items.iter().any(contains_ref),
            _ => false,
        }
    }

    #[test]
    fn test_primitives_required_and_defaults() {
        let mut with_default = user("b", TypeRef::Number);
        with_default.default = Some(json!(1.5));
        let params = vec![
            user("a", TypeRef::String),
            with_default,
            user("c", TypeRef::Integer),
            user("d", TypeRef::Boolean),
        ];
        let schema = build_input_schema("calc", &params, &DocBlock::default()).unwrap();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["a"]["type"], "string");
        assert_eq!(schema["properties"]["b"]["type"], "number");
        assert_eq!(schema["properties"]["c"]["type"], "integer");
        assert_eq!(schema["properties"]["d"]["type"], "boolean");
        assert_eq!(schema["properties"]["b"]["default"], json!(1.5));
        assert!(schema["properties"]["a"].get("default").is_none());
        assert_eq!(schema["required"], json!(["a", "c", "d"]));

        let keys: Vec<&String> = schema["properties"].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_titles_and_descriptions() {
        let doc = DocBlock::parse("Does it.\n\nArgs:\n    first_name: Given name.");
        let schema =
            build_input_schema("greet", &[user("first_name", TypeRef::String)], &doc).unwrap();
        assert_eq!(
            schema["properties"]["first_name"],
            json!({"type": "string", "description": "Given name.", "title": "First Name"})
        );
    }

    #[test]
    fn test_no_required_when_all_defaulted() {
        let mut p = user("x", TypeRef::Integer);
        p.default = Some(json!(0));
        let schema = build_input_schema("a", &[p], &DocBlock::default()).unwrap();
        assert!(schema.get("required").is_none());
    }

    #[test]
    fn test_unannotated_is_string() {
        let p = ParameterSpec {
            name: "raw".to_string(),
            declared_type: None,
            managed: None,
            default: None,
        };
        let schema = build_input_schema("a", &[p], &DocBlock::default()).unwrap();
        assert_eq!(schema["properties"]["raw"]["type"], "string");
        let out = build_output_schema("a", None, &DocBlock::default()).unwrap();
        assert_eq!(out, json!({"type": "string", "description": ""}));
    }

    #[test]
    fn test_managed_parameters_are_excluded() {
        let mut secret = user("token", TypeRef::Secret);
        secret.managed = Some(ManagedKind::Secret);
        secret.default = Some(json!("unused"));
        let mut oauth = user("google", TypeRef::oauth2_secret("google", ["s1", "s2"]));
        oauth.managed = Some(ManagedKind::OAuth2Secret {
            provider: "google".to_string(),
            scopes: vec!["s1".to_string(), "s2".to_string()],
        });
        let mut source = user("db", TypeRef::DataSource);
        source.managed = Some(ManagedKind::DataSource);
        let params = vec![secret, user("q", TypeRef::String), oauth, source];

        let schema = build_input_schema("a", &params, &DocBlock::default()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 1);
        assert!(properties.contains_key("q"));
        assert_eq!(schema["required"], json!(["q"]));

        let managed = build_managed_schema(&params, &DocBlock::default());
        assert_eq!(managed["token"], json!({"type": "Secret"}));
        assert_eq!(
            managed["google"],
            json!({"type": "OAuth2Secret", "provider": "google", "scopes": ["s1", "s2"]})
        );
        assert_eq!(managed["db"], json!({"type": "DataSource"}));
        assert!(managed.get("q").is_none());
    }

    #[test]
    fn test_structured_parameter_is_inlined() {
        let doc = DocBlock::parse("x\n\nArgs:\n    customer: The customer.");
        let schema = build_input_schema(
            "create",
            &[user("customer", TypeRef::structured::<Customer>())],
            &doc,
        )
        .unwrap();
        let customer = &schema["properties"]["customer"];
        assert!(!contains_ref(&schema));
        assert_eq!(customer["title"], "Customer");
        assert_eq!(customer["description"], "The customer.");
        assert_eq!(customer["properties"]["address"]["properties"]["zip"]["type"], "integer");
        assert_eq!(
            customer["properties"]["previous"]["items"]["properties"]["street"]["type"],
            "string"
        );
        assert!(customer.get("$schema").is_none());
    }

    #[test]
    fn test_raw_types_are_adapted() {
        let schema = build_input_schema(
            "a",
            &[
                user("tags", TypeRef::list(TypeRef::String)),
                user("limits", TypeRef::map(TypeRef::optional(TypeRef::Integer))),
                user("color", TypeRef::literal(["red", "green"])),
            ],
            &DocBlock::default(),
        )
        .unwrap();
        assert_eq!(
            schema["properties"]["tags"],
            json!({"type": "array", "items": {"type": "string"}, "title": "Tags"})
        );
        assert_eq!(
            schema["properties"]["limits"]["additionalProperties"],
            json!({"anyOf": [{"type": "integer"}, {"type": "null"}]})
        );
        assert_eq!(
            schema["properties"]["color"],
            json!({"enum": ["red", "green"], "type": "string", "title": "Color"})
        );
    }

    #[test]
    fn test_output_schema() {
        let doc = DocBlock::parse("x\n\nReturns:\n    The total.");
        let out = build_output_schema("sum", Some(&TypeRef::Integer), &doc).unwrap();
        assert_eq!(out, json!({"type": "integer", "description": "The total."}));

        let out = build_output_schema("list", Some(&TypeRef::list(TypeRef::Integer)), &doc).unwrap();
        assert_eq!(out["type"], "array");
        assert_eq!(out["title"], "Return Value");

        let out = build_output_schema("c", Some(&TypeRef::structured::<Address>()), &doc).unwrap();
        assert_eq!(out["title"], "Address");
        assert_eq!(out["description"], "The total.");
    }

    #[test]
    fn test_unsupported_type_fails_fast() {
        let err = build_input_schema(
            "connect",
            &[user("sock", TypeRef::list(TypeRef::opaque("TcpStream")))],
            &DocBlock::default(),
        )
        .unwrap_err();
        match err {
            DiscoveryError::UnsupportedType { action, param, type_name, kind } => {
                assert_eq!(action, "connect");
                assert_eq!(param, "sock");
                assert_eq!(type_name, "list[TcpStream]");
                assert_eq!(kind, "parameter");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = build_output_schema("connect", Some(&TypeRef::Secret), &DocBlock::default())
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedType { kind: "return", .. }));
    }

    #[test]
    fn test_recursive_structure_is_rejected() {
        let err = build_input_schema(
            "walk",
            &[user("tree", TypeRef::structured::<Tree>())],
            &DocBlock::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DiscoveryError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_inline_refs_merges_siblings() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "a": {"$ref": "#/$defs/A", "description": "kept"}
            },
            "$defs": {"A": {"type": "integer", "description": "dropped"}}
        });
        let inlined = inline_refs(schema).unwrap();
        assert_eq!(
            inlined,
            json!({
                "type": "object",
                "properties": {"a": {"description": "kept", "type": "integer"}}
            })
        );
        assert_eq!(
            inline_refs(json!({"$ref": "#/definitions/Missing"})).unwrap_err(),
            "#/definitions/Missing"
        );
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("first_name"), "First Name");
        assert_eq!(title_case("x"), "X");
        assert_eq!(title_case("HTTP_url"), "Http Url");
        assert_eq!(title_case("file2name"), "File2Name");
        assert_eq!(title_case("max__size"), "Max  Size");
        assert_eq!(title_case("_private"), " Private");
    }
}
