// Dotted-path placeholder handling. Templates declare paths like
// `customer.name`; the request payload is arbitrary nested JSON.

use serde_json::Value;

/// Walk a dotted path through nested objects. Returns None as soon as a
/// segment is missing or the current value is not an object.
pub fn resolve_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// A placeholder counts as missing when the path does not resolve, resolves
/// to null, or resolves to a blank string.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// All required paths that do not resolve to a usable value, in declaration
/// order, so the caller can report every problem at once.
pub fn missing_placeholders(payload: &Value, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|path| resolve_path(payload, path).map_or(true, is_blank))
        .cloned()
        .collect()
}

/// Render a scalar payload value as the text that goes into the document.
pub fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Flatten the payload into (dotted path, text) pairs for every scalar leaf.
/// Arrays are not substituted into documents and are skipped.
pub fn flatten_scalars(payload: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    collect_scalars(payload, String::new(), &mut pairs);
    pairs
}

fn collect_scalars(value: &Value, prefix: String, pairs: &mut Vec<(String, String)>) {
    if let Value::Object(map) = value {
        for (key, child) in map {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            collect_scalars(child, path, pairs);
        }
        return;
    }

    if prefix.is_empty() {
        // A bare scalar payload has no path to substitute under.
        return;
    }

    if let Some(text) = display_value(value) {
        pairs.push((prefix, text));
    }
}
