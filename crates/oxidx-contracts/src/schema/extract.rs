use serde_json::{Map, Value};

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Finds the JSON object a model embedded in a free-form reply.
///
/// A ```` ```json ```` fence narrows the search to its body; the span from
/// the first `{` to the last `}` must then parse as an object.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let mut text = text.trim();
    if let Some((_, after_fence)) = text.split_once(JSON_FENCE) {
        text = after_fence
            .split_once(FENCE)
            .map(|(body, _)| body)
            .unwrap_or(after_fence)
            .trim();
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Tool-call arguments recovered from a reply that carried no structured
/// call. Models often echo the whole function envelope, so a `parameters`
/// or `arguments` mapping wins over the outer object. An empty mapping is
/// not a call.
pub fn tool_arguments_from_text(text: &str) -> Option<Map<String, Value>> {
    let extracted = extract_json_object(text)?;
    let arguments = ["parameters", "arguments"]
        .into_iter()
        .find_map(|wrapper| match extracted.get(wrapper) {
            Some(Value::Object(inner)) => Some(inner.clone()),
            _ => None,
        })
        .unwrap_or(extracted);
    if arguments.is_empty() {
        return None;
    }
    Some(arguments)
}
