use serde_json::{Map, Value};

use super::DEFAULT_KIND;

/// Normalizes arbitrary model output into the shape of a component tree.
///
/// Strings that are fully bracketed JSON are decoded and normalized in turn,
/// sequences keep only elements that end up as mappings, and mappings get
/// their `type_name`, `children` and `props` fixed up. Anything that does
/// not decode is kept as-is rather than replaced with an invented structure.
///
/// `sanitize(sanitize(x)) == sanitize(x)` for every `x`.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(text) => sanitize_string(text),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(sanitize)
                .filter(Value::is_object)
                .collect(),
        ),
        Value::Object(map) => Value::Object(sanitize_mapping(map)),
        other => other,
    }
}

fn sanitize_string(text: String) -> Value {
    let trimmed = text.trim();
    let bracketed = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if bracketed {
        if let Ok(decoded) = serde_json::from_str::<Value>(trimmed) {
            return sanitize(decoded);
        }
    }
    Value::String(trimmed.to_string())
}

fn sanitize_mapping(map: Map<String, Value>) -> Map<String, Value> {
    let mut cleaned: Map<String, Value> = map
        .into_iter()
        .map(|(key, value)| (key, sanitize(value)))
        .collect();

    let has_content = cleaned.contains_key("children") || cleaned.contains_key("props");
    if has_content && !cleaned.contains_key("type_name") {
        cleaned.insert(
            "type_name".to_string(),
            Value::String(DEFAULT_KIND.to_string()),
        );
    }
    if let Some(children) = cleaned.get_mut("children") {
        if !children.is_array() {
            *children = Value::Array(Vec::new());
        }
    }
    if let Some(props) = cleaned.get_mut("props") {
        if !props.is_object() {
            *props = Value::Object(Map::new());
        }
    }
    cleaned
}
