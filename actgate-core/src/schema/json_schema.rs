//! # JSON-Schema Documents
//!
//! Companion documents generated by `protoc-gen-jsonschema` for every message type of a main
//! file. Before they are handed out, two house-keeping rewrites make them usable by callers:
//!
//! * The correlation property is removed everywhere (and from `required` lists). The gateway
//!   fills it in itself, callers must never be asked for it.
//! * Every `$ref` is pointed at the local `#/definitions/` namespace so each document is
//!   self-contained.
use serde_json::{Map, Value};

const REF_KEY: &str = "$ref";
const REQUIRED_KEY: &str = "required";
const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// A JSON-Schema document for one message type.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSchemaDoc {
    /// Fully qualified message name without leading dot (e.g. `router.EchoRequest`).
    pub type_name: String,
    pub schema: Value,
}

impl JsonSchemaDoc {
    /// Builds a document from raw plugin output, applying the house-keeping rewrites.
    pub fn from_generated(
        type_name: impl Into<String>,
        mut schema: Value,
        correlation_field: &str,
    ) -> Self {
        let hidden = [correlation_field.to_string(), lower_camel_case(correlation_field)];
        strip_properties(&mut schema, &hidden);
        prefix_refs(&mut schema);

        Self {
            type_name: type_name.into(),
            schema,
        }
    }

    /// A permissive object schema used for types the plugin produced nothing for.
    pub fn empty(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let schema = serde_json::json!({
            "$schema": "http://json-schema.org/draft-04/schema#",
            "title": type_name,
            "type": "object",
            "properties": {},
        });
        Self { type_name, schema }
    }
}

/// Converts a `snake_case` proto field name to the `lowerCamelCase` JSON name protoc derives.
pub fn lower_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn strip_properties(value: &mut Value, hidden: &[String]) {
    match value {
        Value::Object(map) => {
            for name in hidden {
                map.remove(name);
            }
            if let Some(Value::Array(required)) = map.get_mut(REQUIRED_KEY) {
                required.retain(|v| !v.as_str().is_some_and(|s| hidden.iter().any(|h| h == s)));
            }
            map.values_mut()
                .for_each(|child| strip_properties(child, hidden));
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|child| strip_properties(child, hidden)),
        _ => {}
    }
}

fn prefix_refs(value: &mut Value) {
    match value {
        Value::Object(map) => {
            rewrite_ref(map);
            map.values_mut().for_each(prefix_refs);
        }
        Value::Array(items) => items.iter_mut().for_each(prefix_refs),
        _ => {}
    }
}

fn rewrite_ref(map: &mut Map<String, Value>) {
    if let Some(Value::String(target)) = map.get_mut(REF_KEY)
        && !target.starts_with('#')
    {
        *target = format!("{DEFINITIONS_PREFIX}{target}");
    }
}
