//! Submitted data → whitelist → filters → validator.
//!
//! Every stage is computed lazily and cached. Filter declarations sit in one
//! global queue and are drained in declaration order, so a field reference
//! always reads what earlier filters already wrote.

use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::config::Method;
use crate::error::FilterError;
use crate::filters::{Callable, FilterArg, FilterRegistry, FilterSpec};
use crate::merge::merge_maps;
use crate::path::{FieldPath, FieldStore};
use crate::reference::{Reference, ReferenceResolver};
use crate::source::{normalize_files, RequestSource};
use crate::validator::{ErrorMap, RuleValidator, Validator};
use crate::value::{is_empty, FormData};

/// Reserved key carrying the submission marker.
pub const SUBMITTED_KEY: &str = "__submitted";
/// Reserved key carrying the anti-forgery token.
pub const CSRF_KEY: &str = "__csrf_token";

static NO_ERRORS: ErrorMap = ErrorMap::new();

pub struct Pipeline {
    form_id: String,
    method: Method,
    raw: FieldStore,
    defaults: FormData,
    whitelist: BTreeSet<String>,
    whitelisted: Option<FormData>,
    filtered: Option<FieldStore>,
    queue: VecDeque<FilterSpec>,
    registry: FilterRegistry,
    resolver: ReferenceResolver,
    validator: Box<dyn Validator>,
    validated: bool,
}

impl Pipeline {
    pub fn new(form_id: impl Into<String>, method: Method) -> Self {
        Self {
            form_id: form_id.into(),
            method,
            raw: FieldStore::default(),
            defaults: FormData::new(),
            whitelist: BTreeSet::new(),
            whitelisted: None,
            filtered: None,
            queue: VecDeque::new(),
            registry: FilterRegistry::new(),
            resolver: ReferenceResolver::default(),
            validator: Box::new(RuleValidator::default()),
            validated: false,
        }
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn set_validator(&mut self, validator: Box<dyn Validator>) {
        self.validator = validator;
        self.validated = false;
    }

    pub fn set_resolver(&mut self, resolver: ReferenceResolver) {
        self.resolver = resolver;
    }

    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    pub fn registry_mut(&mut self) -> &mut FilterRegistry {
        &mut self.registry
    }

    /// Restrict processing to these top-level keys. Bracket groups are
    /// stripped, so `address[city]` allows all of `address`.
    pub fn set_whitelist<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.whitelist = fields
            .into_iter()
            .map(|f| FieldPath::parse(f.as_ref()).base_key().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        self.invalidate();
    }

    pub fn whitelist_keys(&self) -> &BTreeSet<String> {
        &self.whitelist
    }

    /// Queue a filter behind every filter already declared.
    pub fn add_filter(&mut self, spec: FilterSpec) {
        self.queue.push_back(spec);
    }

    /// Number of declared filters that have not run yet.
    pub fn pending_filters(&self) -> usize {
        self.queue.len()
    }

    // ─── Form data lifecycle ─────────────────────────────────────────────────

    /// Pull this form's submission from `source`. An empty submission leaves
    /// existing data untouched; upload metadata is written after text values.
    pub fn fetch(&mut self, source: &dyn RequestSource) {
        let mut submitted = source
            .fields(self.method)
            .get(&self.form_id)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        if let Some(files) = source.files().get(&self.form_id).and_then(Value::as_object) {
            for (key, meta) in normalize_files(files) {
                submitted.insert(key, meta);
            }
        }

        if submitted.values().all(is_empty) {
            log::debug!("form '{}': empty submission ignored", self.form_id);
            return;
        }

        log::debug!(
            "form '{}': fetched {} field(s) via {}",
            self.form_id,
            submitted.len(),
            self.method
        );
        self.raw = FieldStore::new(submitted);
        self.apply_defaults();
        self.invalidate();
    }

    /// Replace the submitted data outright.
    pub fn overwrite(&mut self, data: FormData) {
        self.raw = FieldStore::new(data);
        self.apply_defaults();
        self.invalidate();
    }

    pub fn clear(&mut self) {
        self.raw = FieldStore::default();
        self.invalidate();
    }

    /// Register defaults. They only fill keys that are absent or empty, now
    /// and on every later fetch.
    pub fn add_defaults(&mut self, defaults: FormData) {
        self.defaults = merge_maps(&self.defaults, &defaults);
        self.apply_defaults();
        self.invalidate();
    }

    fn apply_defaults(&mut self) {
        for (key, value) in &self.defaults {
            let path = FieldPath::parse(key);
            if self.raw.get(&path).map_or(true, is_empty) {
                self.raw.set(&path, value.clone());
            }
        }
    }

    fn invalidate(&mut self) {
        self.whitelisted = None;
        self.filtered = None;
        self.validated = false;
    }

    /// Submitted data as received, plus defaults.
    pub fn data(&self) -> &FormData {
        self.raw.data()
    }

    pub fn is_submitted(&self) -> bool {
        self.raw
            .data()
            .get(SUBMITTED_KEY)
            .is_some_and(|v| !is_empty(v))
    }

    pub fn submitted_token(&self) -> Option<&str> {
        self.raw.data().get(CSRF_KEY).and_then(Value::as_str)
    }

    // ─── Whitelist ───────────────────────────────────────────────────────────

    pub fn whitelist(&mut self) -> &FormData {
        if self.whitelist.is_empty() {
            return self.raw.data();
        }
        let raw = &self.raw;
        let allowed = &self.whitelist;
        self.whitelisted.get_or_insert_with(|| {
            raw.data()
                .iter()
                .filter(|(key, _)| {
                    allowed.contains(key.as_str()) || key.as_str() == SUBMITTED_KEY || key.as_str() == CSRF_KEY
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
    }

    // ─── Filter ──────────────────────────────────────────────────────────────

    pub fn filter(&mut self) -> &FormData {
        if self.filtered.is_none() {
            let seed = self.whitelist().clone();
            self.filtered = Some(FieldStore::new(seed));
        }
        while let Some(spec) = self.queue.pop_front() {
            self.run_filter(&spec);
        }
        self.filtered.get_or_insert_with(FieldStore::default).data()
    }

    fn run_filter(&mut self, spec: &FilterSpec) {
        let Some(filtered) = self.filtered.as_mut() else {
            return;
        };
        let Some(callable) = self.registry.resolve(&spec.callable) else {
            log::debug!(
                "form '{}': no filter named '{}', '{}' left unchanged",
                self.form_id,
                spec.callable,
                spec.field
            );
            return;
        };

        let target = FieldPath::parse(&spec.field).collection();
        let args = {
            let current: &FieldStore = filtered;
            match &spec.params {
                None => Some(vec![FilterArg::Value(current.get_or(&target, Value::Null))]),
                Some(params) => params
                    .iter()
                    .map(|p| resolve_param(p, &self.resolver, &self.registry, current))
                    .collect::<Option<Vec<_>>>(),
            }
        };
        let Some(args) = args else {
            log::debug!(
                "form '{}': unresolved filter reference in '{}' on '{}', skipped",
                self.form_id,
                spec.callable,
                spec.field
            );
            return;
        };

        match invoke(&callable, &args) {
            Ok(value) => {
                log::trace!("form '{}': {} -> {}", self.form_id, callable.name(), target);
                filtered.set(&target, value);
            }
            Err(err) => {
                log::warn!(
                    "form '{}': filter on '{}' failed, value kept: {}",
                    self.form_id,
                    spec.field,
                    err
                );
            }
        }
    }

    /// Value of `path` as of the latest stage computed: filtered data once
    /// the filter stage ran, submitted data before.
    pub fn current_value(&self, path: &FieldPath) -> Option<&Value> {
        let path = path.collection();
        match &self.filtered {
            Some(filtered) => filtered.get(&path),
            None => self.raw.get(&path),
        }
    }

    // ─── Validate ────────────────────────────────────────────────────────────

    /// Run the validator over filtered data; never over raw input.
    pub fn validate(&mut self) -> bool {
        self.filter();
        if let Some(filtered) = &self.filtered {
            self.validator.set_data(filtered.data());
        }
        self.validated = true;
        self.validator.validate()
    }

    /// Errors of the last validation run; empty before any run.
    pub fn errors(&self) -> &ErrorMap {
        if self.validated {
            self.validator.errors()
        } else {
            &NO_ERRORS
        }
    }

    pub fn field_errors(&self, path: &FieldPath) -> &[String] {
        let errors = self.errors();
        errors
            .get(path.as_str())
            .or_else(|| errors.get(path.collection().as_str()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_error(&self, path: &FieldPath) -> bool {
        !self.field_errors(path).is_empty()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("form_id", &self.form_id)
            .field("method", &self.method)
            .field("raw", &self.raw)
            .field("whitelist", &self.whitelist)
            .field("pending_filters", &self.queue.len())
            .field("validated", &self.validated)
            .finish()
    }
}

/// Resolve one declared parameter against the current filtered state.
/// `None` means a filter reference could not be resolved.
fn resolve_param(
    param: &Value,
    resolver: &ReferenceResolver,
    registry: &FilterRegistry,
    filtered: &FieldStore,
) -> Option<FilterArg> {
    match resolver.detect(param) {
        Some(Reference::Filter(name)) => registry.resolve(name).map(FilterArg::Filter),
        Some(Reference::Field(path)) => Some(FilterArg::Value(
            filtered.get_or(&FieldPath::parse(path).collection(), Value::Null),
        )),
        None => Some(FilterArg::Value(resolve_nested(param, resolver, filtered))),
    }
}

fn resolve_nested(value: &Value, resolver: &ReferenceResolver, filtered: &FieldStore) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match resolver.field_path(item) {
                    Some(path) => filtered.get_or(&FieldPath::parse(path).collection(), Value::Null),
                    None => resolve_nested(item, resolver, filtered),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Call a filter, turning a panic anywhere inside it (including filters it
/// calls through a reference) into an ordinary failure.
fn invoke(callable: &Callable, args: &[FilterArg]) -> Result<Value, FilterError> {
    catch_unwind(AssertUnwindSafe(|| callable.call(args)))
        .unwrap_or_else(|_| Err(FilterError::failed(callable.name(), "filter panicked")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use crate::validator::Rule;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data(value: Value) -> FormData {
        value.as_object().cloned().unwrap()
    }

    fn pipeline(value: Value) -> Pipeline {
        let mut p = Pipeline::new("form_1", Method::Post);
        p.overwrite(data(value));
        p
    }

    #[test]
    fn test_whitelist_keeps_reserved_keys() {
        let mut p = pipeline(json!({
            "email": "a@b.c",
            "admin": "1",
            SUBMITTED_KEY: "1",
            CSRF_KEY: "tok"
        }));
        p.set_whitelist(["email"]);
        let keys: Vec<_> = p.whitelist().keys().cloned().collect();
        assert_eq!(keys, vec!["email", SUBMITTED_KEY, CSRF_KEY]);
    }

    #[test]
    fn test_empty_whitelist_passes_through() {
        let mut p = pipeline(json!({"a": "1", "b": "2"}));
        assert_eq!(p.whitelist().len(), 2);
    }

    #[test]
    fn test_whitelist_strips_brackets() {
        let mut p = pipeline(json!({"address": {"city": "Oslo"}, "x": 1}));
        p.set_whitelist(["address[city]"]);
        assert_eq!(Value::Object(p.whitelist().clone()), json!({"address": {"city": "Oslo"}}));
    }

    #[test]
    fn test_filters_run_once_in_order() {
        let mut p = pipeline(json!({"name": "  ada  ", "copy": ""}));
        p.add_filter(FilterSpec::new("trim", "name"));
        p.add_filter(FilterSpec::new("copy", "copy").with_params(vec![json!("~{name}~")]));
        let first = p.filter().clone();
        assert_eq!(p.pending_filters(), 0);
        assert_eq!(first["copy"], json!("ada"));
        let second = p.filter().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_filter_is_skipped() {
        let mut p = pipeline(json!({"name": " x "}));
        p.add_filter(FilterSpec::new("no_such_filter", "name"));
        assert_eq!(p.filter()["name"], json!(" x "));
    }

    #[test]
    fn test_unresolvable_filter_reference_skips_filter() {
        let mut p = pipeline(json!({"tags": ["a"]}));
        p.add_filter(FilterSpec::new("map", "tags").with_params(vec![json!("@nope"), json!("~{tags}~")]));
        assert_eq!(p.filter()["tags"], json!(["a"]));
    }

    #[test]
    fn test_failing_filter_keeps_value() {
        let mut p = pipeline(json!({"age": ["x"]}));
        p.add_filter(FilterSpec::new("int", "age"));
        assert_eq!(p.filter()["age"], json!(["x"]));
    }

    #[test]
    fn test_panicking_custom_filter_keeps_value() {
        let mut p = pipeline(json!({"name": "ok"}));
        p.registry_mut().register("explode", |_args: &[FilterArg]| -> Result<Value, FilterError> {
            panic!("boom")
        });
        p.add_filter(FilterSpec::new("@explode", "name"));
        assert_eq!(p.filter()["name"], json!("ok"));
    }

    #[test]
    fn test_map_with_panicking_reference_keeps_value() {
        let mut p = pipeline(json!({"tags": ["a", "b"]}));
        p.registry_mut().register("explode", |_args: &[FilterArg]| -> Result<Value, FilterError> {
            panic!("boom")
        });
        p.add_filter(FilterSpec::new("map", "tags").with_params(vec![json!("@explode"), json!("~{tags}~")]));
        assert_eq!(p.filter()["tags"], json!(["a", "b"]));
        assert_eq!(p.pending_filters(), 0);
    }

    #[test]
    fn test_map_with_failing_reference_keeps_value() {
        let mut p = pipeline(json!({"tags": ["a", "b"]}));
        p.registry_mut().register("reject", |_args: &[FilterArg]| -> Result<Value, FilterError> {
            Err(FilterError::failed("reject", "no"))
        });
        p.add_filter(FilterSpec::new("map", "tags").with_params(vec![json!("@reject"), json!("~{tags}~")]));
        p.add_filter(FilterSpec::new("map", "tags").with_params(vec![json!("@uppercase"), json!("~{tags}~")]));
        assert_eq!(p.filter()["tags"], json!(["A", "B"]));
    }

    #[test]
    fn test_substr_with_extreme_length_from_field() {
        let mut p = pipeline(json!({"s": "abcdef", "n": "9223372036854775807", "out": ""}));
        p.add_filter(FilterSpec::new("int", "n"));
        p.add_filter(
            FilterSpec::new("substr", "out").with_params(vec![json!("~{s}~"), json!(1), json!("~{n}~")]),
        );
        let clean = p.filter().clone();
        assert_eq!(clean["n"], json!(i64::MAX));
        assert_eq!(clean["out"], json!("bcdef"));
    }

    #[test]
    fn test_filter_creates_missing_path() {
        let mut p = pipeline(json!({"first": "Ada", "last": "Lovelace"}));
        p.add_filter(
            FilterSpec::new("concat", "profile[full]")
                .with_params(vec![json!("~{first}~"), json!(" "), json!("~{last}~")]),
        );
        assert_eq!(p.filter()["profile"], json!({"full": "Ada Lovelace"}));
    }

    #[test]
    fn test_field_references_inside_lists() {
        let mut p = pipeline(json!({"a": "x", "b": "y"}));
        p.add_filter(
            FilterSpec::new("join", "both").with_params(vec![json!(["~{a}~", "~{b}~"]), json!("-")]),
        );
        assert_eq!(p.filter()["both"], json!("x-y"));
    }

    #[test]
    fn test_defaults_do_not_override_submitted() {
        let mut p = Pipeline::new("form_1", Method::Post);
        p.add_defaults(data(json!({"a": "1", "b": "default"})));
        let source = StaticSource::new().with_submission(Method::Post, "form_1", json!({"a": "2"}));
        p.fetch(&source);
        assert_eq!(p.data()["a"], json!("2"));
        assert_eq!(p.data()["b"], json!("default"));
    }

    #[test]
    fn test_empty_submission_does_not_overwrite() {
        let mut p = pipeline(json!({"a": "kept"}));
        let source = StaticSource::new().with_submission(Method::Post, "form_1", json!({"a": ""}));
        p.fetch(&source);
        assert_eq!(p.data()["a"], json!("kept"));
    }

    #[test]
    fn test_fetch_reads_only_own_method_and_form() {
        let mut p = Pipeline::new("form_1", Method::Post);
        let source = StaticSource::new()
            .with_submission(Method::Get, "form_1", json!({"a": "get"}))
            .with_submission(Method::Post, "form_2", json!({"a": "other"}));
        p.fetch(&source);
        assert!(p.data().is_empty());
    }

    #[test]
    fn test_upload_metadata_wins_over_text() {
        let mut p = Pipeline::new("form_1", Method::Post);
        let source = StaticSource::new()
            .with_submission(Method::Post, "form_1", json!({"avatar": "typed"}))
            .with_files("form_1", json!({"name": {"avatar": "me.png"}, "size": {"avatar": 3}}));
        p.fetch(&source);
        assert_eq!(p.data()["avatar"], json!({"name": "me.png", "size": 3}));
    }

    #[test]
    fn test_validator_sees_filtered_data() {
        let mut validator = RuleValidator::default();
        validator.add_rule("code", Rule::MaxLength { max: 3 }).unwrap();
        let mut p = pipeline(json!({"code": "  abc  "}));
        p.set_validator(Box::new(validator));
        p.add_filter(FilterSpec::new("trim", "code"));
        assert!(p.validate());
        assert!(p.errors().is_empty());
    }

    #[test]
    fn test_errors_empty_before_validation() {
        let mut validator = RuleValidator::default();
        validator.add_rule("name", Rule::Required).unwrap();
        let mut p = pipeline(json!({}));
        p.set_validator(Box::new(validator));
        assert!(p.errors().is_empty());
        assert!(!p.validate());
        assert!(p.has_error(&FieldPath::parse("name")));
    }

    #[test]
    fn test_current_value_follows_latest_stage() {
        let mut p = pipeline(json!({"name": " x "}));
        p.add_filter(FilterSpec::new("trim", "name"));
        let path = FieldPath::parse("name");
        assert_eq!(p.current_value(&path), Some(&json!(" x ")));
        p.filter();
        assert_eq!(p.current_value(&path), Some(&json!("x")));
    }
}
