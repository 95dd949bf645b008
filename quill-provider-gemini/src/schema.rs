//! JSON-Schema → Gemini schema translation.
//!
//! Gemini declares function parameters in an OpenAPI-flavored vocabulary
//! with uppercase type names. This walk carries over the supported subset
//! (`type`, `description`, `properties`, `required`, `items`, `enum`) and
//! ignores anything else.

use serde_json::{json, Map, Value};

fn map_type(json_schema_type: &str) -> Option<&'static str> {
    match json_schema_type {
        "string" => Some("STRING"),
        "number" => Some("NUMBER"),
        "integer" => Some("INTEGER"),
        "boolean" => Some("BOOLEAN"),
        "array" => Some("ARRAY"),
        "object" => Some("OBJECT"),
        _ => None,
    }
}

/// Translate one schema node. Missing or non-object input yields an empty
/// object schema.
pub fn to_gemini_schema(schema: &Value) -> Value {
    let Some(node) = schema.as_object() else {
        return json!({ "type": "OBJECT" });
    };

    let mut out = Map::new();

    if let Some(mapped) = node
        .get("type")
        .and_then(|t| t.as_str())
        .and_then(map_type)
    {
        out.insert("type".into(), json!(mapped));
    }
    if let Some(description) = node.get("description").and_then(|d| d.as_str()) {
        out.insert("description".into(), json!(description));
    }
    if let Some(required) = node.get("required").and_then(|r| r.as_array()) {
        out.insert("required".into(), Value::Array(required.clone()));
    }
    if let Some(enumeration) = node.get("enum").and_then(|e| e.as_array()) {
        out.insert("enum".into(), Value::Array(enumeration.clone()));
    }
    if let Some(properties) = node.get("properties").and_then(|p| p.as_object()) {
        let translated: Map<String, Value> = properties
            .iter()
            .map(|(name, sub)| (name.clone(), to_gemini_schema(sub)))
            .collect();
        out.insert("properties".into(), Value::Object(translated));
    }
    if let Some(items) = node.get("items") {
        out.insert("items".into(), to_gemini_schema(items));
    }

    Value::Object(out)
}
