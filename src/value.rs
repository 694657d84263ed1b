//! Helpers over `serde_json::Value`, the representation used for every
//! submitted value, attribute value and option tree.

use serde_json::{Map, Value};

/// Ordered mapping of top-level field keys to submitted values.
pub type FormData = Map<String, Value>;

/// Empty means "nothing submitted": null, "", [] or {}.
///
/// `false` and `0` are real values and are not empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Text form of a scalar. Lists and maps have no text form.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "" }.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Text form used when a value has to be written into markup.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(scalar_text)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => String::new(),
        other => scalar_text(other).unwrap_or_default(),
    }
}

/// Equality as seen by a form: scalars compare by their text form, so a
/// submitted `"1"` equals a configured `1`.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Array(_), _) | (_, Value::Array(_)) => false,
        (Value::Object(_), _) | (_, Value::Object(_)) => false,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => scalar_text(a) == scalar_text(b),
    }
}

/// True when `candidate` equals `current`, or is a member of it when `current`
/// is a list (multi-valued fields such as `colors[]`).
pub fn matches_input(candidate: &Value, current: &Value) -> bool {
    match current {
        Value::Array(items) => items.iter().any(|item| loosely_equal(candidate, item)),
        Value::Object(map) => map.values().any(|item| loosely_equal(candidate, item)),
        other => loosely_equal(candidate, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_empty() {
        assert!(is_empty(&Value::Null));
        assert!(is_empty(&json!("")));
        assert!(is_empty(&json!([])));
        assert!(is_empty(&json!({})));
        assert!(!is_empty(&json!(0)));
        assert!(!is_empty(&json!(false)));
        assert!(!is_empty(&json!("0")));
    }

    #[test]
    fn test_loosely_equal_compares_scalar_text() {
        assert!(loosely_equal(&json!("1"), &json!(1)));
        assert!(loosely_equal(&json!("blue"), &json!("blue")));
        assert!(!loosely_equal(&json!("1"), &json!([1])));
        assert!(!loosely_equal(&Value::Null, &json!("")));
    }

    #[test]
    fn test_matches_input_list_membership() {
        let current = json!(["red", "blue"]);
        assert!(matches_input(&json!("blue"), &current));
        assert!(!matches_input(&json!("green"), &current));
    }

    #[test]
    fn test_display_text() {
        assert_eq!(display_text(&json!(["a", 1])), "a,1");
        assert_eq!(display_text(&json!(true)), "1");
        assert_eq!(display_text(&Value::Null), "");
    }
}
