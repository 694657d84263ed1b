use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{FormError, FormResult};
use crate::filters::FilterSpec;
use crate::reference::FieldWrapper;
use crate::validator::FieldRules;

pub const DEFAULT_ENCTYPE: &str = "application/x-www-form-urlencoded";
pub const MULTIPART_ENCTYPE: &str = "multipart/form-data";
pub const DEFAULT_ERROR_CLASS: &str = "error";

/// Submit method. Exactly one per form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Post,
    Get,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Get => "GET",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POST" => Ok(Method::Post),
            "GET" => Ok(Method::Get),
            _ => Err(FormError::InvalidMethod {
                method: s.to_string(),
            }),
        }
    }
}

/// Anti-forgery token setting: a token string enables the check, `false`
/// disables it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CsrfToken {
    Token(String),
    Flag(bool),
}

impl Default for CsrfToken {
    fn default() -> Self {
        CsrfToken::Flag(false)
    }
}

impl CsrfToken {
    pub fn token(&self) -> Option<&str> {
        match self {
            CsrfToken::Token(t) if !t.is_empty() => Some(t),
            _ => None,
        }
    }
}

/// Construction-time configuration of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Form identifier; generated as `form_{n}` when absent.
    pub id: Option<String>,
    /// `POST` or `GET`.
    pub method: String,
    pub action: Option<String>,
    pub enctype: String,
    pub csrf_token: CsrfToken,
    /// Allowed top-level field keys. Empty means unrestricted.
    pub whitelist: Vec<String>,
    /// Filter declarations, executed in this order.
    pub filters: Vec<FilterSpec>,
    pub rules: FieldRules,
    /// Class appended to class-bearing fields in error.
    pub error_class: String,
    /// Per-field default attributes.
    pub default_attributes: BTreeMap<String, Map<String, Value>>,
    pub field_wrapper: FieldWrapper,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            id: None,
            method: Method::Post.as_str().to_string(),
            action: None,
            enctype: DEFAULT_ENCTYPE.to_string(),
            csrf_token: CsrfToken::default(),
            whitelist: Vec::new(),
            filters: Vec::new(),
            rules: FieldRules::new(),
            error_class: DEFAULT_ERROR_CLASS.to_string(),
            default_attributes: BTreeMap::new(),
            field_wrapper: FieldWrapper::default(),
        }
    }
}

impl FormConfig {
    pub fn from_yaml(yaml: &str) -> FormResult<Self> {
        let config: FormConfig = serde_yaml::from_str(yaml)?;
        config.parsed_method()?;
        Ok(config)
    }

    pub fn parsed_method(&self) -> FormResult<Method> {
        self.method.parse()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = CsrfToken::Token(token.into());
        self
    }

    pub fn with_whitelist<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, spec: FilterSpec) -> Self {
        self.filters.push(spec);
        self
    }
}
