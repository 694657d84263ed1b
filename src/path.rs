//! Field paths and the nested store they address.
//!
//! A path is a base key followed by bracket groups (`address[city]`,
//! `colors[]`) or dotted segments (`address.city`). Lookups never fail: a
//! missing key is simply absent.

use serde_json::{Map, Value};
use std::fmt;

use crate::merge::next_index;
use crate::value::FormData;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Self {
        let (head, mut rest) = match raw.find('[') {
            Some(pos) => (&raw[..pos], &raw[pos..]),
            None => (raw, ""),
        };

        let mut segments: Vec<String> = head.split('.').map(str::to_string).collect();

        while let Some(stripped) = rest.strip_prefix('[') {
            match stripped.find(']') {
                Some(end) => {
                    segments.push(stripped[..end].to_string());
                    rest = &stripped[end + 1..];
                }
                None => {
                    // Unclosed group: keep the remainder as a literal segment.
                    segments.push(stripped.to_string());
                    rest = "";
                }
            }
        }
        if !rest.is_empty() {
            segments.push(rest.to_string());
        }

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    /// Build a path from already split segments; the first is the base key.
    pub fn from_segments(segments: Vec<String>) -> Self {
        let mut segments = segments;
        if segments.is_empty() {
            segments.push(String::new());
        }
        let mut raw = segments[0].clone();
        for segment in &segments[1..] {
            raw.push('[');
            raw.push_str(segment);
            raw.push(']');
        }
        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Top-level key, with bracket groups and dotted tails stripped.
    pub fn base_key(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    /// Segments below the base key. An empty segment stands for `[]`.
    pub fn tail(&self) -> &[String] {
        self.segments.get(1..).unwrap_or(&[])
    }

    /// True for paths ending in `[]`, i.e. multi-valued fields.
    pub fn is_multi(&self) -> bool {
        self.segments.len() > 1 && self.segments.last().is_some_and(|s| s.is_empty())
    }

    /// The same path with trailing `[]` groups dropped, addressing the list
    /// itself instead of its next free slot.
    pub fn collection(&self) -> FieldPath {
        let mut segments = self.segments.clone();
        while segments.len() > 1 && segments.last().is_some_and(|s| s.is_empty()) {
            segments.pop();
        }
        FieldPath::from_segments(segments)
    }

    /// Transport name of this field inside a form: `form_1[address][city]`.
    pub fn qualified_name(&self, form_id: &str) -> String {
        let mut name = format!("{}[{}]", form_id, self.base_key());
        for segment in self.tail() {
            name.push('[');
            name.push_str(segment);
            name.push(']');
        }
        name
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for FieldPath {
    fn from(raw: &str) -> Self {
        FieldPath::parse(raw)
    }
}

/// Mutable tree of field values addressed by [`FieldPath`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldStore {
    data: FormData,
}

impl FieldStore {
    pub fn new(data: FormData) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &FormData {
        &self.data
    }

    pub fn into_data(self) -> FormData {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let mut current = self.data.get(path.base_key())?;
        for segment in path.tail() {
            if segment.is_empty() {
                continue;
            }
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn get_or(&self, path: &FieldPath, default: Value) -> Value {
        self.get(path).cloned().unwrap_or(default)
    }

    /// Write `value` at `path`, creating intermediate containers. Whatever
    /// was there before is replaced.
    pub fn set(&mut self, path: &FieldPath, value: Value) {
        let mut node = self
            .data
            .entry(path.base_key().to_string())
            .or_insert(Value::Null);
        for segment in path.tail() {
            node = child_mut(node, segment);
        }
        *node = value;
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    if segment.is_empty() && node.is_object() {
        // `[]` on a map appends under the next integer key.
        let key = match &*node {
            Value::Object(map) => next_index(map),
            _ => 0,
        };
        return child_mut(node, &key.to_string());
    }
    if segment.is_empty() {
        if !node.is_array() {
            *node = Value::Array(Vec::new());
        }
    } else if let Value::Array(items) = &mut *node {
        let fits = segment
            .parse::<usize>()
            .is_ok_and(|index| index <= items.len());
        if !fits {
            let map: Map<String, Value> = std::mem::take(items)
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect();
            *node = Value::Object(map);
        }
    }

    match node {
        Value::Array(items) => {
            let index = segment.parse::<usize>().unwrap_or(items.len());
            if index == items.len() {
                items.push(Value::Null);
            }
            &mut items[index]
        }
        Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
        other => {
            *other = if segment == "0" {
                Value::Array(Vec::new())
            } else {
                Value::Object(Map::new())
            };
            child_mut(other, segment)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store(value: Value) -> FieldStore {
        match value {
            Value::Object(map) => FieldStore::new(map),
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_parse_brackets_and_dots() {
        let path = FieldPath::parse("address[city]");
        assert_eq!(path.base_key(), "address");
        assert_eq!(path.tail(), &["city".to_string()]);

        let dotted = FieldPath::parse("address.city");
        assert_eq!(dotted.base_key(), "address");
        assert_eq!(dotted.tail(), &["city".to_string()]);

        let multi = FieldPath::parse("colors[]");
        assert!(multi.is_multi());
        assert_eq!(multi.base_key(), "colors");
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(FieldPath::parse("email").qualified_name("form_1"), "form_1[email]");
        assert_eq!(
            FieldPath::parse("address[city]").qualified_name("form_1"),
            "form_1[address][city]"
        );
        assert_eq!(FieldPath::parse("colors[]").qualified_name("f"), "f[colors][]");
    }

    #[test]
    fn test_get_nested_and_missing() {
        let s = store(json!({"address": {"city": "Lyon"}, "tags": ["a", "b"]}));
        assert_eq!(s.get(&"address[city]".into()), Some(&json!("Lyon")));
        assert_eq!(s.get(&"tags[1]".into()), Some(&json!("b")));
        assert_eq!(s.get(&"tags[]".into()), Some(&json!(["a", "b"])));
        assert_eq!(s.get(&"address[zip]".into()), None);
        assert_eq!(s.get(&"nope".into()), None);
        assert_eq!(s.get_or(&"nope".into(), json!("x")), json!("x"));
    }

    #[test]
    fn test_set_creates_path() {
        let mut s = FieldStore::default();
        s.set(&"address[city]".into(), json!("Paris"));
        s.set(&"tags[]".into(), json!("first"));
        s.set(&"tags[]".into(), json!("second"));
        assert_eq!(
            Value::Object(s.into_data()),
            json!({"address": {"city": "Paris"}, "tags": ["first", "second"]})
        );
    }

    #[test]
    fn test_set_replaces_existing_value() {
        let mut s = store(json!({"name": {"first": "a"}}));
        s.set(&"name".into(), json!("flat"));
        assert_eq!(s.get(&"name".into()), Some(&json!("flat")));
    }

    #[test]
    fn test_append_on_map_keeps_entries() {
        let mut s = store(json!({"tags": {"0": "a", "main": "b"}}));
        s.set(&"tags[]".into(), json!("c"));
        assert_eq!(s.get(&"tags".into()), Some(&json!({"0": "a", "main": "b", "1": "c"})));
    }

    #[test]
    fn test_set_string_key_on_list_converts_to_map() {
        let mut s = store(json!({"tags": ["a"]}));
        s.set(&"tags[main]".into(), json!("b"));
        assert_eq!(s.get(&"tags".into()), Some(&json!({"0": "a", "main": "b"})));
    }
}
