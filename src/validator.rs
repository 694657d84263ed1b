//! The validation collaborator.
//!
//! The pipeline only talks to the [`Validator`] trait. [`RuleValidator`] is a
//! small rule set good enough for typical forms; anything richer plugs in by
//! implementing the trait.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use crate::error::{FormError, FormResult};
use crate::path::{FieldPath, FieldStore};
use crate::value::{display_text, is_empty, loosely_equal, matches_input, FormData};

/// Field path → ordered error messages. Absent or empty means valid.
pub type ErrorMap = BTreeMap<String, Vec<String>>;

pub trait Validator {
    /// Replace the data the next `validate` call looks at.
    fn set_data(&mut self, data: &FormData);

    /// Run every rule; true when no field collected an error.
    fn validate(&mut self) -> bool;

    fn errors(&self) -> &ErrorMap;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    Required,
    Email,
    Numeric,
    MinLength { min: usize },
    MaxLength { max: usize },
    Pattern { pattern: String },
    In { values: Vec<Value> },
    /// Must equal another field's value.
    Equals { field: String },
}

/// Rules per field path, in declaration order per field.
pub type FieldRules = BTreeMap<String, Vec<Rule>>;

#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    rules: FieldRules,
    patterns: HashMap<String, Regex>,
    data: FieldStore,
    errors: ErrorMap,
}

impl RuleValidator {
    pub fn new(rules: FieldRules) -> FormResult<Self> {
        let mut validator = Self::default();
        for (field, field_rules) in rules {
            for rule in field_rules {
                validator.add_rule(&field, rule)?;
            }
        }
        Ok(validator)
    }

    pub fn add_rule(&mut self, field: &str, rule: Rule) -> FormResult<()> {
        if let Rule::Pattern { pattern } = &rule {
            if !self.patterns.contains_key(pattern) {
                let re = Regex::new(pattern).map_err(|e| FormError::InvalidRule {
                    field: field.to_string(),
                    reason: e.to_string(),
                })?;
                self.patterns.insert(pattern.clone(), re);
            }
        }
        self.rules.entry(field.to_string()).or_default().push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &FieldRules {
        &self.rules
    }

    fn check(&self, rule: &Rule, value: &Value) -> Option<String> {
        if !matches!(rule, Rule::Required) && is_empty(value) {
            return None;
        }
        match rule {
            Rule::Required => is_empty(value).then(|| "This field is required.".to_string()),
            Rule::Email => {
                static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
                let re = EMAIL_REGEX
                    .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
                (!re.is_match(&display_text(value)))
                    .then(|| "Please enter a valid email address.".to_string())
            }
            Rule::Numeric => display_text(value)
                .trim()
                .parse::<f64>()
                .is_err()
                .then(|| "Please enter a number.".to_string()),
            Rule::MinLength { min } => (length(value) < *min)
                .then(|| format!("Please enter at least {} characters.", min)),
            Rule::MaxLength { max } => (length(value) > *max)
                .then(|| format!("Please enter no more than {} characters.", max)),
            Rule::Pattern { pattern } => {
                let matched = self
                    .patterns
                    .get(pattern)
                    .is_some_and(|re| re.is_match(&display_text(value)));
                (!matched).then(|| "Please match the requested format.".to_string())
            }
            Rule::In { values } => {
                let allowed = |v: &Value| values.iter().any(|a| loosely_equal(a, v));
                let ok = match value {
                    Value::Array(items) => items.iter().all(allowed),
                    other => allowed(other),
                };
                (!ok).then(|| "Please select a valid option.".to_string())
            }
            Rule::Equals { field } => {
                let other = self.data.get_or(&FieldPath::parse(field), Value::Null);
                (!matches_input(value, &other) || value.is_array() != other.is_array())
                    .then(|| format!("Must match {}.", field))
            }
        }
    }
}

fn length(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => display_text(other).chars().count(),
    }
}

impl Validator for RuleValidator {
    fn set_data(&mut self, data: &FormData) {
        self.data = FieldStore::new(data.clone());
    }

    fn validate(&mut self) -> bool {
        let mut errors = ErrorMap::new();
        for (field, rules) in &self.rules {
            let value = self.data.get_or(&FieldPath::parse(field), Value::Null);
            let messages: Vec<String> = rules.iter().filter_map(|r| self.check(r, &value)).collect();
            if !messages.is_empty() {
                errors.insert(field.clone(), messages);
            }
        }
        log::debug!("validation finished with {} invalid field(s)", errors.len());
        self.errors = errors;
        self.errors.is_empty()
    }

    fn errors(&self) -> &ErrorMap {
        &self.errors
    }
}
