//! Step input resolution.
//!
//! A string of the form `${a.b.c}` is looked up in the caller's context by
//! dotted path; a missing path resolves to `{}`. Any other string becomes
//! `{"input": s}`. Arrays merge the object results of their items, objects
//! pass through, and every other value becomes `{}`.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

/// A whole-string `${dotted.path}` reference.
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\}$").unwrap()
});

/// Resolve a step's input template against `context`.
pub fn resolve_input(template: &Value, context: &Value) -> Value {
    match template {
        Value::String(s) => match REFERENCE_RE.captures(s) {
            Some(caps) => lookup(context, &caps[1])
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
            None => json!({ "input": s }),
        },
        Value::Array(items) => {
            let mut merged = Map::new();
            for item in items {
                if let Value::Object(fields) = resolve_input(item, context) {
                    merged.extend(fields);
                }
            }
            Value::Object(merged)
        }
        Value::Object(_) => template.clone(),
        _ => Value::Object(Map::new()),
    }
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(context, |value, part| value.as_object()?.get(part))
        .filter(|value| !value.is_null())
}
