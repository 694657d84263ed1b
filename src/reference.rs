//! Masked references inside filter declarations.
//!
//! Two disjoint grammars are recognised in string tokens:
//! - `@name` names a filter (custom registry first, then built-ins)
//! - `~{path}~` points at another field's current filtered value
//!
//! Detection never dereferences anything; resolving a reference against
//! field data is the pipeline's job.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::{FormError, FormResult};

pub const DEFAULT_FIELD_PREFIX: &str = "~{";
pub const DEFAULT_FIELD_SUFFIX: &str = "}~";

/// Prefix/suffix pair wrapped around a field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWrapper {
    pub prefix: String,
    pub suffix: String,
}

impl Default for FieldWrapper {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_FIELD_PREFIX.to_string(),
            suffix: DEFAULT_FIELD_SUFFIX.to_string(),
        }
    }
}

/// A detected reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<'a> {
    Filter(&'a str),
    Field(&'a str),
}

fn filter_regex() -> &'static Regex {
    static FILTER_REGEX: OnceLock<Regex> = OnceLock::new();
    FILTER_REGEX.get_or_init(|| Regex::new(r"^@(.+)$").unwrap())
}

#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    wrapper: FieldWrapper,
    field_regex: Regex,
}

impl Default for ReferenceResolver {
    fn default() -> Self {
        static DEFAULT_FIELD_REGEX: OnceLock<Regex> = OnceLock::new();
        let field_regex = DEFAULT_FIELD_REGEX
            .get_or_init(|| Regex::new(r"^~\{(.+)\}~$").unwrap())
            .clone();
        Self {
            wrapper: FieldWrapper::default(),
            field_regex,
        }
    }
}

impl ReferenceResolver {
    /// Build a resolver for a custom field wrapper. Both parts are matched literally.
    pub fn new(wrapper: FieldWrapper) -> FormResult<Self> {
        if wrapper.prefix.is_empty() || wrapper.suffix.is_empty() {
            return Err(FormError::InvalidFieldWrapper(
                "prefix and suffix must be non-empty".to_string(),
            ));
        }
        if wrapper.prefix.starts_with('@') {
            return Err(FormError::InvalidFieldWrapper(format!(
                "prefix '{}' would collide with filter references",
                wrapper.prefix
            )));
        }
        let pattern = format!(
            "^{}(.+){}$",
            regex::escape(&wrapper.prefix),
            regex::escape(&wrapper.suffix)
        );
        let field_regex =
            Regex::new(&pattern).map_err(|e| FormError::InvalidFieldWrapper(e.to_string()))?;
        Ok(Self {
            wrapper,
            field_regex,
        })
    }

    pub fn wrapper(&self) -> &FieldWrapper {
        &self.wrapper
    }

    /// Unmasked filter name, if `token` is `@name`.
    pub fn filter_name<'a>(&self, token: &'a Value) -> Option<&'a str> {
        let s = token.as_str()?;
        filter_regex()
            .captures(s)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Unmasked field path, if `token` is wrapped in the field pattern.
    pub fn field_path<'a>(&self, token: &'a Value) -> Option<&'a str> {
        let s = token.as_str()?;
        self.field_regex
            .captures(s)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    pub fn detect<'a>(&self, token: &'a Value) -> Option<Reference<'a>> {
        if let Some(name) = self.filter_name(token) {
            return Some(Reference::Filter(name));
        }
        self.field_path(token).map(Reference::Field)
    }

    pub fn mask_field(&self, path: &str) -> String {
        format!("{}{}{}", self.wrapper.prefix, path, self.wrapper.suffix)
    }
}

pub fn mask_filter(name: &str) -> String {
    format!("@{}", name)
}

/// Strip a leading `@` from a callable name, if present.
pub fn callable_name(callable: &str) -> &str {
    callable.strip_prefix('@').unwrap_or(callable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detects_filter_reference() {
        let resolver = ReferenceResolver::default();
        assert_eq!(resolver.filter_name(&json!("@trim")), Some("trim"));
        assert_eq!(resolver.detect(&json!("@trim")), Some(Reference::Filter("trim")));
        assert_eq!(resolver.filter_name(&json!("@")), None);
        assert_eq!(resolver.filter_name(&json!("trim")), None);
        assert_eq!(resolver.filter_name(&json!(mask_filter("slug"))), Some("slug"));
    }

    #[test]
    fn test_detects_field_reference() {
        let resolver = ReferenceResolver::default();
        assert_eq!(
            resolver.detect(&json!("~{address[city]}~")),
            Some(Reference::Field("address[city]"))
        );
        assert_eq!(resolver.field_path(&json!("~{}~")), None);
        assert_eq!(resolver.field_path(&json!("x~{a}~")), None);
    }

    #[test]
    fn test_non_strings_are_never_references() {
        let resolver = ReferenceResolver::default();
        assert_eq!(resolver.detect(&json!(42)), None);
        assert_eq!(resolver.detect(&json!(["@trim"])), None);
        assert_eq!(resolver.detect(&Value::Null), None);
    }

    #[test]
    fn test_custom_wrapper() {
        let resolver = ReferenceResolver::new(FieldWrapper {
            prefix: "{{".to_string(),
            suffix: "}}".to_string(),
        })
        .unwrap();
        assert_eq!(resolver.field_path(&json!("{{email}}")), Some("email"));
        assert_eq!(resolver.field_path(&json!("~{email}~")), None);
        assert_eq!(resolver.mask_field("email"), "{{email}}");
    }

    #[test]
    fn test_rejects_empty_wrapper() {
        let result = ReferenceResolver::new(FieldWrapper {
            prefix: String::new(),
            suffix: "]".to_string(),
        });
        assert!(matches!(result, Err(FormError::InvalidFieldWrapper(_))));
    }
}
