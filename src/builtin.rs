//! Builtin actions shipped with the binary.

use anyhow::{bail, Context};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::action::{ActionDeclaration, ActionOptions, Arguments, ParamDecl};
use crate::invoker::current_action;
use crate::types::TypeRef;

const MODULE: &str = "builtin";

/// Upper bound for `greet`'s `times`.
const MAX_GREETINGS: u32 = 100;

/// A point in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

async fn add(args: Arguments) -> anyhow::Result<Value> {
    let a: i64 = args.get("a")?;
    let b: i64 = args.get("b")?;
    let sum = a.checked_add(b).context("integer overflow")?;
    Ok(json!(sum))
}

async fn divide(args: Arguments) -> anyhow::Result<Value> {
    let dividend: f64 = args.get("dividend")?;
    let divisor: f64 = args.get("divisor")?;
    if divisor == 0.0 {
        bail!("cannot divide {dividend} by zero");
    }
    Ok(json!(dividend / divisor))
}

async fn greet(args: Arguments) -> anyhow::Result<Value> {
    let name: String = args.get("name")?;
    let greeting: String = args.get("greeting")?;
    let times = args.get::<Option<u32>>("times")?.unwrap_or(1);
    if times > MAX_GREETINGS {
        bail!("cannot greet {times} times, at most {MAX_GREETINGS} greetings are allowed");
    }
    let line = format!("{greeting}, {name}!");
    Ok(json!(vec![line; times as usize].join(" ")))
}

async fn word_count(args: Arguments) -> anyhow::Result<Value> {
    let text: String = args.get("text")?;
    let mut counts = serde_json::Map::new();
    for word in text.split_whitespace().map(str::to_lowercase) {
        let entry = counts.entry(word).or_insert(json!(0));
        *entry = json!(entry.as_u64().unwrap_or(0) + 1);
    }
    Ok(Value::Object(counts))
}

async fn distance(args: Arguments) -> anyhow::Result<Value> {
    let a: Point = args.get("a")?;
    let b: Point = args.get("b")?;
    Ok(json!((a.x - b.x).hypot(a.y - b.y)))
}

async fn midpoint(args: Arguments) -> anyhow::Result<Value> {
    let a: Point = args.get("a")?;
    let b: Point = args.get("b")?;
    let mid = Point {
        x: (a.x + b.x) / 2.0,
        y: (a.y + b.y) / 2.0,
    };
    Ok(serde_json::to_value(mid)?)
}

async fn mask_secret(args: Arguments) -> anyhow::Result<Value> {
    let secret: String = args.get("api_key")?;
    let visible: String = secret.chars().take(4).collect();
    let hidden = secret.chars().count().saturating_sub(4);
    Ok(json!(format!("{visible}{}", "*".repeat(hidden))))
}

async fn whoami(_args: Arguments) -> anyhow::Result<Value> {
    let current = current_action().context("not running inside an action")?;
    Ok(json!({"action": current.name, "run_id": current.run_id.to_string()}))
}

/// Declarations of every builtin action.
pub fn declarations() -> Vec<ActionDeclaration> {
    vec![
        ActionDeclaration::new("add", add)
            .module(MODULE)
            .doc(
                "Adds two integers.\n\n\
                 Args:\n    a: The first addend.\n    b: The second addend.\n\n\
                 Returns:\n    The sum of both numbers.",
            )
            .param(ParamDecl::of::<i64>("a"))
            .param(ParamDecl::of::<i64>("b"))
            .returns(TypeRef::Integer),
        ActionDeclaration::new("divide", divide)
            .module(MODULE)
            .doc(
                "Divides one number by another.\n\n\
                 Args:\n    dividend: The number to divide.\n    divisor: The number to divide by.\n        Must not be zero.\n\n\
                 Returns:\n    The quotient.",
            )
            .param(ParamDecl::of::<f64>("dividend"))
            .param(ParamDecl::of::<f64>("divisor"))
            .returns(TypeRef::Number),
        ActionDeclaration::new("greet", greet)
            .module(MODULE)
            .doc(
                "Greets someone.\n\n\
                 # Arguments\n\n\
                 * `name` - Who to greet.\n\
                 * `greeting` - The greeting to use.\n\
                 * `times` - How many times to repeat the greeting, at most 100.\n\n\
                 # Returns\n\n\
                 The greeting.",
            )
            .param(ParamDecl::of::<String>("name"))
            .param(ParamDecl::of::<String>("greeting").default("Hello"))
            .param(ParamDecl::of::<Option<u32>>("times").default(None::<u32>))
            .returns(TypeRef::String)
            .options(ActionOptions {
                is_consequential: Some(false),
                display_name: Some("Greet".to_string()),
            }),
        ActionDeclaration::new("word_count", word_count)
            .module(MODULE)
            .doc(
                "Counts the words of a text, case-insensitively.\n\n\
                 Args:\n    text: The text to analyse.\n\n\
                 Returns:\n    Occurrences per lowercased word.",
            )
            .param(ParamDecl::of::<String>("text"))
            .returns(TypeRef::map(TypeRef::Integer)),
        ActionDeclaration::new("distance", distance)
            .module(MODULE)
            .doc(
                "Euclidean distance between two points.\n\n\
                 Args:\n    a: First point.\n    b: Second point.",
            )
            .param(ParamDecl::new("a", TypeRef::structured::<Point>()))
            .param(ParamDecl::new("b", TypeRef::structured::<Point>()))
            .returns(TypeRef::Number),
        ActionDeclaration::new("midpoint", midpoint)
            .module(MODULE)
            .doc(
                "Point halfway between two points.\n\n\
                 Args:\n    a: First point.\n    b: Second point.\n\n\
                 Returns:\n    The midpoint.",
            )
            .param(ParamDecl::new("a", TypeRef::structured::<Point>()))
            .param(ParamDecl::new("b", TypeRef::structured::<Point>()))
            .returns(TypeRef::structured::<Point>()),
        ActionDeclaration::new("mask_secret", mask_secret)
            .module(MODULE)
            .doc(
                "Shows the configured API key with all but its first characters hidden.\n\n\
                 Args:\n    api_key: The key, supplied from the managed values.",
            )
            .param(ParamDecl::new("api_key", TypeRef::Secret))
            .returns(TypeRef::String),
        ActionDeclaration::new("whoami", whoami)
            .module(MODULE)
            .doc("Reports the name and run id of the running action."),
    ]
}
