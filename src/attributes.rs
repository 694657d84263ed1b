//! Attribute synthesis for a single field.
//!
//! Precedence, lowest first: taxonomy defaults, per-field defaults (deep
//! merged), explicit attributes of the call (replaced by key). The error class
//! is appended last.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::merge::merge_maps;
use crate::path::FieldPath;
use crate::pipeline::Pipeline;
use crate::taxonomy;
use crate::value::{display_text, matches_input, scalar_text};

/// Per-field default attributes, keyed by field path.
pub type FieldDefaults = BTreeMap<String, AttributeSet>;

/// Ordered attribute name → value mapping.
///
/// `null` and `true` render name-only, `false` suppresses the attribute, a
/// list renders space-separated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(Map<String, Value>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.shift_remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Deep-merge `overlay` on top of these attributes.
    pub fn merged(&self, overlay: &AttributeSet) -> AttributeSet {
        AttributeSet(merge_maps(&self.0, &overlay.0))
    }

    /// Append a class token, keeping whatever classes are already there.
    pub fn append_class(&mut self, class: &str) {
        let existing = self
            .0
            .get("class")
            .map(|v| match v {
                Value::Array(_) => display_text(v).replace(',', " "),
                other => scalar_text(other).unwrap_or_default(),
            })
            .unwrap_or_default();
        if existing.split_whitespace().any(|c| c == class) {
            return;
        }
        let joined = if existing.trim().is_empty() {
            class.to_string()
        } else {
            format!("{} {}", existing.trim(), class)
        };
        self.set("class", joined);
    }

    /// Serialise as ` name="value"` pairs, each with a leading space.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.0 {
            match value {
                Value::Bool(false) => {}
                Value::Null | Value::Bool(true) => {
                    out.push(' ');
                    out.push_str(name);
                }
                Value::Object(_) => {
                    log::debug!("attribute '{}' has a map value, not rendered", name);
                }
                Value::Array(items) => {
                    let joined: Vec<String> = items.iter().filter_map(scalar_text).collect();
                    out.push_str(&format!(" {}=\"{}\"", name, escape_html(&joined.join(" "))));
                }
                other => {
                    let text = scalar_text(other).unwrap_or_default();
                    out.push_str(&format!(" {}=\"{}\"", name, escape_html(&text)));
                }
            }
        }
        out
    }
}

impl From<Map<String, Value>> for AttributeSet {
    fn from(map: Map<String, Value>) -> Self {
        AttributeSet(map)
    }
}

impl<'a> FromIterator<(&'a str, Value)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (&'a str, Value)>>(iter: T) -> Self {
        AttributeSet(iter.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

/// Escape text for use inside markup and quoted attribute values.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

/// Read-only view over the state attribute synthesis depends on.
#[derive(Debug, Clone, Copy)]
pub struct AttributeRenderer<'a> {
    pub form_id: &'a str,
    pub pipeline: &'a Pipeline,
    pub defaults: &'a FieldDefaults,
    pub error_class: &'a str,
}

impl AttributeRenderer<'_> {
    pub fn render(&self, field: &FieldPath, type_name: &str, explicit: &AttributeSet) -> AttributeSet {
        let spec = taxonomy::lookup(type_name);
        let qualified = field.qualified_name(self.form_id);
        let current = self.pipeline.current_value(field);

        let mut attrs = AttributeSet::new();
        for attribute in spec.attributes {
            match *attribute {
                "name" | "id" | "for" | "data-error_for" => attrs.set(attribute, qualified.clone()),
                "type" => attrs.set("type", type_name),
                "value" if spec.repopulate => {
                    if let Some(value) = current.filter(|v| !v.is_null()) {
                        attrs.set("value", display_text(value));
                    }
                }
                _ => {}
            }
        }

        let field_defaults = self
            .defaults
            .get(field.as_str())
            .or_else(|| self.defaults.get(field.collection().as_str()))
            .filter(|_| spec.names_field());
        if let Some(field_defaults) = field_defaults {
            attrs = attrs.merged(field_defaults);
        }
        for (name, value) in explicit.iter() {
            attrs.set(name, value.clone());
        }

        if let Some(flag) = spec.selection_attribute() {
            if !explicit.contains(flag) {
                let selected = match (attrs.get("value"), current) {
                    (Some(candidate), Some(current)) if !candidate.is_null() => {
                        matches_input(candidate, current)
                    }
                    _ => false,
                };
                if selected {
                    attrs.set(flag, flag);
                } else {
                    attrs.remove(flag);
                }
            }
        }

        if spec.is_class_bearing() && self.pipeline.has_error(field) {
            attrs.append_class(self.error_class);
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Method;
    use crate::validator::{Rule, RuleValidator};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pipeline(value: Value) -> Pipeline {
        let mut p = Pipeline::new("form_1", Method::Post);
        p.overwrite(value.as_object().cloned().unwrap());
        p
    }

    fn render(p: &Pipeline, field: &str, ty: &str, explicit: AttributeSet) -> String {
        let defaults = FieldDefaults::new();
        let renderer = AttributeRenderer {
            form_id: "form_1",
            pipeline: p,
            defaults: &defaults,
            error_class: "error",
        };
        renderer.render(&FieldPath::parse(field), ty, &explicit).render()
    }

    #[test]
    fn test_text_defaults() {
        let p = pipeline(json!({"email": "a@b.c"}));
        assert_eq!(
            render(&p, "email", "text", AttributeSet::new()),
            r#" name="form_1[email]" id="form_1[email]" type="text" value="a@b.c""#
        );
    }

    #[test]
    fn test_value_absent_when_nothing_submitted() {
        let p = pipeline(json!({}));
        assert_eq!(
            render(&p, "email", "text", AttributeSet::new()),
            r#" name="form_1[email]" id="form_1[email]" type="text""#
        );
    }

    #[test]
    fn test_password_is_not_repopulated() {
        let p = pipeline(json!({"pw": "secret"}));
        assert!(!render(&p, "pw", "password", AttributeSet::new()).contains("secret"));
    }

    #[test]
    fn test_explicit_attributes_win() {
        let p = pipeline(json!({"email": "a@b.c"}));
        let out = render(
            &p,
            "email",
            "email",
            AttributeSet::new().with("id", "contact").with("required", true).with("value", "x"),
        );
        assert_eq!(
            out,
            r#" name="form_1[email]" id="contact" type="email" value="x" required"#
        );
    }

    #[test]
    fn test_checkbox_checked_by_membership() {
        let p = pipeline(json!({"colors": ["red", "blue"]}));
        let blue = render(&p, "colors[]", "checkbox", AttributeSet::new().with("value", "blue"));
        assert!(blue.contains(r#"checked="checked""#), "{}", blue);
        assert!(blue.contains(r#"name="form_1[colors][]""#));
        let green = render(&p, "colors[]", "checkbox", AttributeSet::new().with("value", "green"));
        assert!(!green.contains("checked"), "{}", green);
    }

    #[test]
    fn test_explicit_false_suppresses_checked() {
        let p = pipeline(json!({"agree": "1"}));
        let out = render(
            &p,
            "agree",
            "checkbox",
            AttributeSet::new().with("value", "1").with("checked", false),
        );
        assert!(!out.contains("checked"));
    }

    #[test]
    fn test_error_class_appended() {
        let mut validator = RuleValidator::default();
        validator.add_rule("email", Rule::Required).unwrap();
        let mut p = pipeline(json!({"email": ""}));
        p.set_validator(Box::new(validator));
        p.validate();

        let bare = render(&p, "email", "text", AttributeSet::new());
        assert!(bare.ends_with(r#" class="error""#), "{}", bare);

        let styled = render(&p, "email", "text", AttributeSet::new().with("class", "wide"));
        assert!(styled.contains(r#"class="wide error""#), "{}", styled);

        let hidden = render(&p, "email", "hidden", AttributeSet::new());
        assert!(!hidden.contains("class"));
    }

    #[test]
    fn test_field_defaults_sit_between_taxonomy_and_explicit() {
        let p = pipeline(json!({}));
        let mut defaults = FieldDefaults::new();
        defaults.insert(
            "email".into(),
            AttributeSet::new().with("class", "wide").with("placeholder", "you@example.com"),
        );
        let renderer = AttributeRenderer {
            form_id: "form_1",
            pipeline: &p,
            defaults: &defaults,
            error_class: "error",
        };
        let attrs = renderer.render(
            &FieldPath::parse("email"),
            "text",
            &AttributeSet::new().with("class", "narrow"),
        );
        assert_eq!(attrs.get("class"), Some(&json!("narrow")));
        assert_eq!(attrs.get("placeholder"), Some(&json!("you@example.com")));

        let label = renderer.render(&FieldPath::parse("email"), "label", &AttributeSet::new());
        assert!(!label.contains("class"));
    }

    #[test]
    fn test_explicit_list_replaces_default_list() {
        let p = pipeline(json!({}));
        let mut defaults = FieldDefaults::new();
        defaults.insert("tags".into(), AttributeSet::new().with("class", json!(["a", "b"])));
        let renderer = AttributeRenderer {
            form_id: "form_1",
            pipeline: &p,
            defaults: &defaults,
            error_class: "error",
        };
        let attrs = renderer.render(
            &FieldPath::parse("tags"),
            "text",
            &AttributeSet::new().with("class", json!(["c"])),
        );
        assert_eq!(attrs.get("class"), Some(&json!(["c"])));
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let p = pipeline(json!({"q": "\"><script>"}));
        let out = render(&p, "q", "search", AttributeSet::new());
        assert!(out.contains(r#"value="&quot;&gt;&lt;script&gt;""#), "{}", out);
    }
}
