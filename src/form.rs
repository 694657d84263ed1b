use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::attributes::{escape_html, AttributeRenderer, AttributeSet, FieldDefaults};
use crate::config::{FormConfig, Method};
use crate::error::{FilterError, FormError, FormResult};
use crate::filters::{FilterArg, FilterSpec};
use crate::path::FieldPath;
use crate::pipeline::{Pipeline, CSRF_KEY, SUBMITTED_KEY};
use crate::reference::ReferenceResolver;
use crate::source::RequestSource;
use crate::tags::{ContentTransform, TagRenderer, TagSettings};
use crate::taxonomy;
use crate::validator::{ErrorMap, RuleValidator, Validator};
use crate::value::FormData;

/// Forms built in this process. Starts at zero; every form constructed
/// without an explicit id takes the next number.
static INSTANCE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Reserve the next generated form id (`form_1`, `form_2`, ...).
pub fn next_form_id() -> String {
    let n = INSTANCE_COUNT.fetch_add(1, Ordering::SeqCst) + 1;
    format!("form_{}", n)
}

/// A form: configuration, its processing pipeline, and render helpers.
pub struct Form {
    id: String,
    config: FormConfig,
    method: Method,
    pipeline: Pipeline,
    defaults: FieldDefaults,
    transform: Option<ContentTransform>,
}

impl Form {
    /// Build a form. Fails only on configuration errors such as an invalid
    /// submit method.
    pub fn new(config: FormConfig) -> FormResult<Self> {
        let method = config.parsed_method()?;
        for spec in &config.filters {
            check_path(&spec.field)?;
        }
        for field in config.default_attributes.keys() {
            check_path(field)?;
        }
        let id = config.id.clone().unwrap_or_else(next_form_id);

        let mut pipeline = Pipeline::new(id.clone(), method);
        pipeline.set_resolver(ReferenceResolver::new(config.field_wrapper.clone())?);
        pipeline.set_validator(Box::new(RuleValidator::new(config.rules.clone())?));
        pipeline.set_whitelist(&config.whitelist);
        for spec in &config.filters {
            pipeline.add_filter(spec.clone());
        }

        let defaults = config
            .default_attributes
            .iter()
            .map(|(field, attrs)| (field.clone(), AttributeSet::from(attrs.clone())))
            .collect();

        log::debug!("form '{}' created ({})", id, method);
        Ok(Self {
            id,
            config,
            method,
            pipeline,
            defaults,
            transform: None,
        })
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str, &str, &str, &str) -> String + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.pipeline.set_validator(validator);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn register_filter<F>(&mut self, name: &str, filter: F)
    where
        F: Fn(&[FilterArg]) -> Result<Value, FilterError> + Send + Sync + 'static,
    {
        self.pipeline.registry_mut().register(name, filter);
    }

    pub fn add_filter(&mut self, spec: FilterSpec) {
        self.pipeline.add_filter(spec);
    }

    /// Merge `attrs` into the default attributes of `field`.
    pub fn set_default_attributes(&mut self, field: &str, attrs: AttributeSet) {
        let merged = match self.defaults.get(field) {
            Some(existing) => existing.merged(&attrs),
            None => attrs,
        };
        self.defaults.insert(field.to_string(), merged);
    }

    // ─── Data ────────────────────────────────────────────────────────────────

    pub fn fetch(&mut self, source: &dyn RequestSource) {
        self.pipeline.fetch(source);
    }

    pub fn overwrite(&mut self, data: FormData) {
        self.pipeline.overwrite(data);
    }

    pub fn clear(&mut self) {
        self.pipeline.clear();
    }

    pub fn add_defaults(&mut self, defaults: FormData) {
        self.pipeline.add_defaults(defaults);
    }

    pub fn is_submitted(&self) -> bool {
        self.pipeline.is_submitted()
    }

    /// True when token checking is disabled or the submitted token matches.
    pub fn is_token_valid(&self) -> bool {
        match self.config.csrf_token.token() {
            None => true,
            Some(expected) => self.pipeline.submitted_token() == Some(expected),
        }
    }

    /// Submitted, carrying the right token, and passing validation.
    pub fn is_valid(&mut self) -> bool {
        if !self.is_submitted() {
            return false;
        }
        if !self.is_token_valid() {
            log::warn!("form '{}': anti-forgery token mismatch", self.id);
            return false;
        }
        self.pipeline.validate()
    }

    pub fn whitelist(&mut self) -> &FormData {
        self.pipeline.whitelist()
    }

    pub fn filter(&mut self) -> &FormData {
        self.pipeline.filter()
    }

    pub fn validate(&mut self) -> bool {
        self.pipeline.validate()
    }

    pub fn errors(&self) -> &ErrorMap {
        self.pipeline.errors()
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        self.pipeline.current_value(&FieldPath::parse(field))
    }

    // ─── Rendering ───────────────────────────────────────────────────────────

    fn renderer(&self) -> TagRenderer<'_> {
        TagRenderer {
            attributes: AttributeRenderer {
                form_id: &self.id,
                pipeline: &self.pipeline,
                defaults: &self.defaults,
                error_class: &self.config.error_class,
            },
            transform: self.transform.as_ref(),
        }
    }

    pub fn attributes(&self, field: &str, type_name: &str, explicit: &AttributeSet) -> AttributeSet {
        self.renderer()
            .attributes
            .render(&FieldPath::parse(field), type_name, explicit)
    }

    pub fn field(&self, field: &str, type_name: &str, settings: &TagSettings) -> String {
        self.renderer()
            .render(&FieldPath::parse(field), type_name, settings)
    }

    pub fn label(&self, field: &str, caption: &str) -> String {
        self.field(field, "label", &TagSettings::new().inner(caption))
    }

    /// First error message of `field`, or an empty string when it is valid.
    pub fn error(&self, field: &str) -> String {
        let path = FieldPath::parse(field);
        match self.pipeline.field_errors(&path).first() {
            Some(message) => self.renderer().render(
                &path,
                "error",
                &TagSettings::new().inner(escape_html(message)),
            ),
            None => String::new(),
        }
    }

    /// Anti-forgery token and submission marker fields.
    pub fn hidden_fields(&self) -> String {
        let token = self.config.csrf_token.token().unwrap_or_default();
        let renderer = self.renderer();
        let mut out = renderer.render(
            &FieldPath::parse(CSRF_KEY),
            "hidden",
            &TagSettings::new().attr("value", token),
        );
        out.push_str(&renderer.render(
            &FieldPath::parse(SUBMITTED_KEY),
            "hidden",
            &TagSettings::new().attr("value", "1"),
        ));
        out
    }

    /// Opening form tag followed by the hidden fields.
    pub fn open(&self, explicit: &AttributeSet) -> String {
        let mut attrs = AttributeSet::new()
            .with("name", self.id.as_str())
            .with("id", self.id.as_str())
            .with("method", self.method.as_str().to_lowercase());
        if let Some(action) = &self.config.action {
            attrs.set("action", action.as_str());
        }
        attrs.set("enctype", self.config.enctype.as_str());
        let attrs = attrs.merged(explicit);

        let form = taxonomy::lookup("form");
        let mut out = taxonomy::fill(form.template, &attrs.render(), "");
        out.push_str(&self.hidden_fields());
        out
    }

    pub fn close(&self) -> String {
        "</form>".to_string()
    }
}

fn check_path(raw: &str) -> FormResult<()> {
    if FieldPath::parse(raw).base_key().is_empty() {
        return Err(FormError::InvalidFieldPath {
            path: raw.to_string(),
            reason: "missing base key".to_string(),
        });
    }
    Ok(())
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("pipeline", &self.pipeline)
            .field("defaults", &self.defaults)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Form::new(FormConfig::default()).unwrap();
        let b = Form::new(FormConfig::default()).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("form_"));
    }

    #[test]
    fn test_invalid_method_is_fatal() {
        let result = Form::new(FormConfig::default().with_method("DELETE"));
        assert!(result.is_err());
    }

    #[test]
    fn test_filter_without_base_key_is_rejected() {
        let config = FormConfig::default().with_filter(FilterSpec::new("trim", "[x]"));
        assert!(matches!(
            Form::new(config),
            Err(FormError::InvalidFieldPath { .. })
        ));
    }

    #[test]
    fn test_open_emits_hidden_fields() {
        let form = Form::new(FormConfig::default().with_id("f").with_csrf_token("tok")).unwrap();
        assert_eq!(
            form.open(&AttributeSet::new()),
            concat!(
                r#"<form name="f" id="f" method="post" enctype="application/x-www-form-urlencoded">"#,
                r#"<input name="f[__csrf_token]" id="f[__csrf_token]" type="hidden" value="tok" />"#,
                r#"<input name="f[__submitted]" id="f[__submitted]" type="hidden" value="1" />"#
            )
        );
    }

    #[test]
    fn test_token_check() {
        let mut form = Form::new(FormConfig::default().with_id("f").with_csrf_token("tok")).unwrap();
        form.overwrite(json!({SUBMITTED_KEY: "1", CSRF_KEY: "forged"}).as_object().cloned().unwrap());
        assert!(!form.is_token_valid());
        assert!(!form.is_valid());

        form.overwrite(json!({SUBMITTED_KEY: "1", CSRF_KEY: "tok"}).as_object().cloned().unwrap());
        assert!(form.is_valid());
    }

    #[test]
    fn test_not_submitted_is_not_valid() {
        let mut form = Form::new(FormConfig::default().with_id("f")).unwrap();
        form.overwrite(json!({"a": "1"}).as_object().cloned().unwrap());
        assert!(!form.is_submitted());
        assert!(!form.is_valid());
    }

    #[test]
    fn test_set_default_attributes_merges() {
        let mut form = Form::new(FormConfig::default().with_id("f")).unwrap();
        form.set_default_attributes("q", AttributeSet::new().with("class", "wide"));
        form.set_default_attributes("q", AttributeSet::new().with("placeholder", "Search"));
        let attrs = form.attributes("q", "search", &AttributeSet::new());
        assert_eq!(attrs.get("class"), Some(&json!("wide")));
        assert_eq!(attrs.get("placeholder"), Some(&json!("Search")));
    }
}
