//! Markup for a single tag, recursing into option trees for containers.

use serde_json::Value;
use std::sync::Arc;

use crate::attributes::{escape_html, AttributeRenderer, AttributeSet};
use crate::path::FieldPath;
use crate::taxonomy;
use crate::value::display_text;

/// Post-processing hook for text content (label, option and textarea only).
///
/// Receives `(form_id, field, type, content)` and returns the replacement
/// content, before escaping. This is where translation plugs in.
pub type ContentTransform = Arc<dyn Fn(&str, &str, &str, &str) -> String + Send + Sync>;

/// Per-call settings for [`TagRenderer::render`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSettings {
    pub attributes: AttributeSet,
    pub inner: Option<String>,
    /// Caption → value. A nested map or list under a caption becomes an
    /// `optgroup`; list entries (or integer keys) use the value as caption.
    pub options: Option<Value>,
}

impl TagSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.set(name, value);
        self
    }

    pub fn attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn inner(mut self, inner: impl Into<String>) -> Self {
        self.inner = Some(inner.into());
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}

#[derive(Clone, Copy)]
pub struct TagRenderer<'a> {
    pub attributes: AttributeRenderer<'a>,
    pub transform: Option<&'a ContentTransform>,
}

impl TagRenderer<'_> {
    pub fn render(&self, field: &FieldPath, type_name: &str, settings: &TagSettings) -> String {
        let spec = taxonomy::lookup(type_name);
        let attrs = self.attributes.render(field, type_name, &settings.attributes);

        let inner = if spec.is_container() {
            let mut inner = settings.inner.clone().unwrap_or_default();
            if let Some(options) = &settings.options {
                inner.push_str(&self.render_options(field, options));
            }
            inner
        } else if spec.has_text_content() {
            let content = match &settings.inner {
                Some(text) => text.clone(),
                None if spec.name == "textarea" => self
                    .attributes
                    .pipeline
                    .current_value(field)
                    .map(display_text)
                    .unwrap_or_default(),
                None => String::new(),
            };
            escape_html(&self.apply_transform(field, spec.name, content))
        } else {
            settings.inner.clone().unwrap_or_default()
        };

        taxonomy::fill(spec.template, &attrs.render(), &inner)
    }

    fn apply_transform(&self, field: &FieldPath, type_name: &str, content: String) -> String {
        match self.transform {
            Some(transform) => transform(self.attributes.form_id, field.as_str(), type_name, &content),
            None => content,
        }
    }

    fn render_options(&self, field: &FieldPath, options: &Value) -> String {
        let entries: Vec<(Option<&str>, &Value)> = match options {
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| {
                    let positional = key.bytes().all(|b| b.is_ascii_digit()) && !key.is_empty();
                    (if positional { None } else { Some(key.as_str()) }, value)
                })
                .collect(),
            Value::Array(items) => items.iter().map(|value| (None, value)).collect(),
            other => {
                log::debug!("options for '{}' must be a map or list, got {}", field, other);
                Vec::new()
            }
        };

        let mut out = String::new();
        for (caption, value) in entries {
            match value {
                Value::Object(_) | Value::Array(_) => {
                    let group = TagSettings::new()
                        .attr("label", caption.unwrap_or_default())
                        .options(value.clone());
                    out.push_str(&self.render(field, "optgroup", &group));
                }
                scalar => {
                    let caption = caption
                        .map(str::to_string)
                        .unwrap_or_else(|| display_text(scalar));
                    let option = TagSettings::new().attr("value", scalar.clone()).inner(caption);
                    out.push_str(&self.render(field, "option", &option));
                }
            }
        }
        out
    }
}
