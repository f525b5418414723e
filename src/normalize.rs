//! Value representation for multi-value columns
//!
//! Array mode keeps lists and objects as structured JSON. Delimited mode
//! turns lists into joined strings and objects into JSON text so every
//! column is a scalar.

use serde_json::{Map, Value};

/// Rewrite list and object values according to the output mode.
///
/// Never drops keys; only the representation of values changes.
pub fn normalize(record: Map<String, Value>, delimiter: Option<&str>) -> Map<String, Value> {
    let Some(delimiter) = delimiter else {
        return record;
    };

    record
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Array(items) => Value::String(join_values(&items, delimiter)),
                Value::Object(obj) => Value::String(Value::Object(obj).to_string()),
                other => other,
            };
            (key, value)
        })
        .collect()
}

fn join_values(items: &[Value], delimiter: &str) -> String {
    items
        .iter()
        .map(stringify)
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Strings are taken as-is; everything else uses its JSON text.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_array_mode_passthrough() {
        let input = record(json!({
            "hashtags": ["rust", "json"],
            "contributors": {"id": 3},
            "id": 1
        }));

        let output = normalize(input.clone(), None);
        assert_eq!(output, input);
    }

    #[test]
    fn test_delimited_mode() {
        let input = record(json!({
            "id": 1,
            "hashtags": ["rust", "json"],
            "user_mentions": [5, 9],
            "symbols": [],
            "contributors": {"id": 3}
        }));

        let output = normalize(input, Some("|"));
        assert_eq!(output["id"], json!(1));
        assert_eq!(output["hashtags"], json!("rust|json"));
        assert_eq!(output["user_mentions"], json!("5|9"));
        assert_eq!(output["symbols"], json!(""));
        assert_eq!(output["contributors"], json!(r#"{"id":3}"#));
        assert_eq!(output.len(), 5);
    }
}
