//! Model-list normalization and the persisted `models_json` encoding.
//!
//! Upstreams disagree on how a model descriptor looks. OpenAI returns
//! objects with an `id`, some proxies return bare strings, others use
//! `name` or `model`. Everything is reduced to a flat list of identifiers.

use serde_json::Value;

/// Extract model identifiers from an arbitrary decoded value.
///
/// Accepts an array of strings or descriptor objects. A string holding a
/// JSON array is decoded first. Anything else yields an empty list.
/// Order is preserved and duplicates are kept.
pub fn normalize_models(input: &Value) -> Vec<String> {
    match input {
        Value::Array(items) => items.iter().filter_map(model_id).collect(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(decoded @ Value::Array(_)) => normalize_models(&decoded),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn model_id(item: &Value) -> Option<String> {
    let raw = match item {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => ["id", "name", "model"]
            .iter()
            .find_map(|field| obj.get(*field).and_then(Value::as_str))?,
        _ => return None,
    };
    let id = raw.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Encode a model list for the `models_json` column.
pub fn models_to_json(models: &[String]) -> String {
    Value::Array(models.iter().cloned().map(Value::String).collect()).to_string()
}

/// Decode a stored `models_json` value; unreadable data yields an empty list.
pub fn models_from_json(raw: &str) -> Vec<String> {
    serde_json::from_str::<Value>(raw)
        .map(|v| normalize_models(&v))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_descriptors() {
        let data = json!([
            {"id": "gpt-4o", "object": "model", "owned_by": "openai"},
            {"id": "gpt-4o-mini", "object": "model"},
        ]);
        assert_eq!(normalize_models(&data), vec!["gpt-4o", "gpt-4o-mini"]);
    }

    #[test]
    fn test_bare_strings_and_fallback_fields() {
        let data = json!(["claude-3-haiku", {"name": "llama-3"}, {"model": "qwen2"}]);
        assert_eq!(normalize_models(&data), vec!["claude-3-haiku", "llama-3", "qwen2"]);
    }

    #[test]
    fn test_skips_blank_and_unusable_entries() {
        let data = json!(["  ", {"id": 42}, null, 7, {"object": "model"}, " gpt-4 "]);
        assert_eq!(normalize_models(&data), vec!["gpt-4"]);
    }

    #[test]
    fn test_keeps_duplicates_in_order() {
        let data = json!(["gpt-4", "gpt-3.5", "gpt-4"]);
        assert_eq!(normalize_models(&data), vec!["gpt-4", "gpt-3.5", "gpt-4"]);
    }

    #[test]
    fn test_non_array_inputs_are_empty() {
        assert!(normalize_models(&json!({"data": "nope"})).is_empty());
        assert!(normalize_models(&json!(null)).is_empty());
        assert!(normalize_models(&json!(12)).is_empty());
        assert!(normalize_models(&json!("not json")).is_empty());
    }

    #[test]
    fn test_string_holding_json_array() {
        let data = json!("[\"a\", \"b\"]");
        assert_eq!(normalize_models(&data), vec!["a", "b"]);
    }

    #[test]
    fn test_json_encoding() {
        let models = vec!["gpt-4".to_string(), "gpt-3.5".to_string()];
        assert_eq!(models_to_json(&models), r#"["gpt-4","gpt-3.5"]"#);
        assert_eq!(models_to_json(&[]), "[]");
        assert_eq!(models_from_json(r#"["gpt-4","gpt-3.5"]"#), models);
        assert!(models_from_json("{broken").is_empty());
    }
}
