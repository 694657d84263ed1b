//! Filter declarations, the built-in filter table, and the custom registry.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::FilterError;
use crate::reference::callable_name;
use crate::value::{is_empty, loosely_equal, scalar_text};

/// Signature shared by built-in filters.
pub type BuiltinFilter = fn(&[FilterArg]) -> Result<Value, FilterError>;

/// Caller-supplied filter.
pub type CustomFilter = Arc<dyn Fn(&[FilterArg]) -> Result<Value, FilterError> + Send + Sync>;

/// One declared transformation step targeting a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Filter name, with or without a leading `@`.
    pub callable: String,
    /// Target field path; the result is written here.
    pub field: String,
    /// Arguments. `None` passes the target field's own current value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
}

impl FilterSpec {
    pub fn new(callable: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            callable: callable.into(),
            field: field.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = Some(params);
        self
    }
}

/// A resolved callable: custom entries shadow built-ins of the same name.
#[derive(Clone)]
pub enum Callable {
    Builtin(&'static str, BuiltinFilter),
    Custom(String, CustomFilter),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Builtin(name, _) => name,
            Callable::Custom(name, _) => name.as_str(),
        }
    }

    pub fn call(&self, args: &[FilterArg]) -> Result<Value, FilterError> {
        match self {
            Callable::Builtin(_, f) => f(args),
            Callable::Custom(_, f) => f(args),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Builtin(name, _) => write!(f, "Builtin({})", name),
            Callable::Custom(name, _) => write!(f, "Custom({})", name),
        }
    }
}

/// An argument after reference resolution.
#[derive(Debug, Clone)]
pub enum FilterArg {
    Value(Value),
    Filter(Callable),
}

impl FilterArg {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FilterArg::Value(v) => Some(v),
            FilterArg::Filter(_) => None,
        }
    }
}

impl From<Value> for FilterArg {
    fn from(value: Value) -> Self {
        FilterArg::Value(value)
    }
}

/// Custom filters, consulted before the built-in table.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    custom: HashMap<String, CustomFilter>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&[FilterArg]) -> Result<Value, FilterError> + Send + Sync + 'static,
    {
        self.custom.insert(name.into(), Arc::new(filter));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.custom.contains_key(callable_name(name))
    }

    /// Custom registry first, then built-ins.
    pub fn resolve(&self, name: &str) -> Option<Callable> {
        let name = callable_name(name);
        if let Some(filter) = self.custom.get(name) {
            return Some(Callable::Custom(name.to_string(), filter.clone()));
        }
        builtin(name).map(|(name, f)| Callable::Builtin(name, f))
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.custom.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry").field("custom", &names).finish()
    }
}

/// Names of every built-in filter.
pub const BUILTIN_FILTERS: &[&str] = &[
    "trim", "ltrim", "rtrim", "lowercase", "uppercase", "ucfirst", "ucwords", "strip_tags",
    "digits", "alnum", "slug", "int", "float", "bool", "default", "replace", "regex_replace",
    "substr", "copy", "concat", "split", "join", "unique", "map",
];

pub fn builtin(name: &str) -> Option<(&'static str, BuiltinFilter)> {
    let f: BuiltinFilter = match name {
        "trim" => |a| map_text("trim", a, |s| s.trim().to_string()),
        "ltrim" => |a| map_text("ltrim", a, |s| s.trim_start().to_string()),
        "rtrim" => |a| map_text("rtrim", a, |s| s.trim_end().to_string()),
        "lowercase" => |a| map_text("lowercase", a, |s| s.to_lowercase()),
        "uppercase" => |a| map_text("uppercase", a, |s| s.to_uppercase()),
        "ucfirst" => |a| map_text("ucfirst", a, ucfirst),
        "ucwords" => |a| map_text("ucwords", a, ucwords),
        "strip_tags" => |a| map_text("strip_tags", a, strip_tags),
        "digits" => |a| map_text("digits", a, |s| s.chars().filter(char::is_ascii_digit).collect()),
        "alnum" => |a| map_text("alnum", a, |s| s.chars().filter(|c| c.is_alphanumeric()).collect()),
        "slug" => |a| map_text("slug", a, slug),
        "int" => to_int,
        "float" => to_float,
        "bool" => to_bool,
        "default" => first_non_empty,
        "replace" => replace,
        "regex_replace" => regex_replace,
        "substr" => substr,
        "copy" => |a| Ok(value_arg("copy", a, 0)?.clone()),
        "concat" => concat,
        "split" => split,
        "join" => join,
        "unique" => unique,
        "map" => map_each,
        _ => return None,
    };
    let name = BUILTIN_FILTERS.iter().copied().find(|n| *n == name)?;
    Some((name, f))
}

// ─── Argument helpers ────────────────────────────────────────────────────────

fn value_arg<'a>(filter: &str, args: &'a [FilterArg], index: usize) -> Result<&'a Value, FilterError> {
    let arg = args.get(index).ok_or_else(|| FilterError::MissingArgument {
        filter: filter.to_string(),
        expected: index + 1,
        got: args.len(),
    })?;
    arg.as_value().ok_or_else(|| FilterError::InvalidArgument {
        filter: filter.to_string(),
        index,
        expected: "a value, not a filter reference".to_string(),
    })
}

fn text_arg(filter: &str, args: &[FilterArg], index: usize) -> Result<String, FilterError> {
    scalar_text(value_arg(filter, args, index)?).ok_or_else(|| FilterError::InvalidArgument {
        filter: filter.to_string(),
        index,
        expected: "a scalar".to_string(),
    })
}

/// Apply `f` to every string in the first argument, descending into lists and
/// maps. Numbers, booleans and null pass through.
fn map_text(filter: &str, args: &[FilterArg], f: fn(&str) -> String) -> Result<Value, FilterError> {
    fn walk(value: &Value, f: fn(&str) -> String) -> Value {
        match value {
            Value::String(s) => Value::String(f(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| walk(v, f)).collect()),
            Value::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), walk(v, f))).collect())
            }
            other => other.clone(),
        }
    }
    Ok(walk(value_arg(filter, args, 0)?, f))
}

// ─── Text transforms ─────────────────────────────────────────────────────────

fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn ucwords(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

fn strip_tags(s: &str) -> String {
    static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = TAG_REGEX.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());
    re.replace_all(s, "").into_owned()
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

// ─── Conversions ─────────────────────────────────────────────────────────────

fn to_int(args: &[FilterArg]) -> Result<Value, FilterError> {
    static INT_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = INT_REGEX.get_or_init(|| Regex::new(r"^[+-]?\d+").unwrap());
    let text = text_arg("int", args, 0)?;
    let parsed = re
        .find(text.trim())
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(0);
    Ok(Value::Number(parsed.into()))
}

fn to_float(args: &[FilterArg]) -> Result<Value, FilterError> {
    static FLOAT_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = FLOAT_REGEX.get_or_init(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").unwrap());
    let text = text_arg("float", args, 0)?;
    let parsed = re
        .find(text.trim())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0);
    Number::from_f64(parsed)
        .map(Value::Number)
        .ok_or_else(|| FilterError::failed("float", format!("'{}' is not a finite number", text)))
}

fn to_bool(args: &[FilterArg]) -> Result<Value, FilterError> {
    let value = value_arg("bool", args, 0)?;
    let truthy = match value {
        Value::Bool(b) => *b,
        v if is_empty(v) => false,
        v => !matches!(
            scalar_text(v).unwrap_or_default().trim().to_lowercase().as_str(),
            "0" | "false" | "off" | "no"
        ),
    };
    Ok(Value::Bool(truthy))
}

// ─── Composition ─────────────────────────────────────────────────────────────

fn first_non_empty(args: &[FilterArg]) -> Result<Value, FilterError> {
    Ok(args
        .iter()
        .filter_map(FilterArg::as_value)
        .find(|v| !is_empty(v))
        .cloned()
        .unwrap_or(Value::Null))
}

fn replace(args: &[FilterArg]) -> Result<Value, FilterError> {
    let needle = text_arg("replace", args, 0)?;
    let replacement = text_arg("replace", args, 1)?;
    if needle.is_empty() {
        return Err(FilterError::failed("replace", "needle must not be empty"));
    }
    let subject = value_arg("replace", args, 2)?;
    Ok(replace_in(subject, &|s: &str| s.replace(&needle, &replacement)))
}

fn regex_replace(args: &[FilterArg]) -> Result<Value, FilterError> {
    let pattern = text_arg("regex_replace", args, 0)?;
    let replacement = text_arg("regex_replace", args, 1)?;
    let re = Regex::new(&pattern).map_err(|e| FilterError::failed("regex_replace", e.to_string()))?;
    let subject = value_arg("regex_replace", args, 2)?;
    Ok(replace_in(subject, &|s: &str| re.replace_all(s, replacement.as_str()).into_owned()))
}

fn replace_in(value: &Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        Value::Array(items) => Value::Array(items.iter().map(|v| replace_in(v, f)).collect()),
        other => other.clone(),
    }
}

fn substr(args: &[FilterArg]) -> Result<Value, FilterError> {
    let subject = text_arg("substr", args, 0)?;
    let start = value_arg("substr", args, 1)?
        .as_i64()
        .ok_or_else(|| FilterError::InvalidArgument {
            filter: "substr".to_string(),
            index: 1,
            expected: "an integer".to_string(),
        })?;
    let chars: Vec<char> = subject.chars().collect();
    let len = chars.len() as i64;
    let from = if start < 0 { len.saturating_add(start).max(0) } else { start.min(len) };
    let to = match args.get(2).and_then(FilterArg::as_value).and_then(Value::as_i64) {
        Some(n) if n < 0 => len.saturating_add(n).max(from),
        Some(n) => from.saturating_add(n).min(len),
        None => len,
    };
    Ok(Value::String(chars[from as usize..to as usize].iter().collect()))
}

fn concat(args: &[FilterArg]) -> Result<Value, FilterError> {
    let mut out = String::new();
    for (index, arg) in args.iter().enumerate() {
        out.push_str(&text_arg("concat", std::slice::from_ref(arg), 0).map_err(|_| {
            FilterError::InvalidArgument {
                filter: "concat".to_string(),
                index,
                expected: "a scalar".to_string(),
            }
        })?);
    }
    Ok(Value::String(out))
}

fn split(args: &[FilterArg]) -> Result<Value, FilterError> {
    let subject = text_arg("split", args, 0)?;
    let delimiter = text_arg("split", args, 1)?;
    if delimiter.is_empty() {
        return Err(FilterError::failed("split", "delimiter must not be empty"));
    }
    if subject.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    Ok(Value::Array(
        subject
            .split(delimiter.as_str())
            .map(|part| Value::String(part.to_string()))
            .collect(),
    ))
}

fn join(args: &[FilterArg]) -> Result<Value, FilterError> {
    let items = value_arg("join", args, 0)?
        .as_array()
        .ok_or_else(|| FilterError::InvalidArgument {
            filter: "join".to_string(),
            index: 0,
            expected: "a list".to_string(),
        })?;
    let glue = text_arg("join", args, 1)?;
    let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
    Ok(Value::String(parts.join(&glue)))
}

fn unique(args: &[FilterArg]) -> Result<Value, FilterError> {
    let items = value_arg("unique", args, 0)?
        .as_array()
        .ok_or_else(|| FilterError::InvalidArgument {
            filter: "unique".to_string(),
            index: 0,
            expected: "a list".to_string(),
        })?;
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !out.iter().any(|seen| loosely_equal(seen, item)) {
            out.push(item.clone());
        }
    }
    Ok(Value::Array(out))
}

/// `map(@filter, list)`: apply a referenced filter to every element.
fn map_each(args: &[FilterArg]) -> Result<Value, FilterError> {
    let callable = match args.first() {
        Some(FilterArg::Filter(callable)) => callable,
        Some(_) => {
            return Err(FilterError::InvalidArgument {
                filter: "map".to_string(),
                index: 0,
                expected: "a filter reference".to_string(),
            })
        }
        None => {
            return Err(FilterError::MissingArgument {
                filter: "map".to_string(),
                expected: 2,
                got: 0,
            })
        }
    };
    match value_arg("map", args, 1)? {
        Value::Array(items) => items
            .iter()
            .map(|item| callable.call(&[FilterArg::Value(item.clone())]))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => callable.call(&[FilterArg::Value(other.clone())]),
    }
}
