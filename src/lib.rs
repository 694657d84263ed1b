//! # formpipe
//!
//! Server-side form handling: render form fields, then take the submission
//! through a whitelist, a queue of filters and a validator.
//!
//! ## Features
//! - Attribute synthesis per field type with repopulation of submitted values
//! - Nested field paths (`address[city]`, `colors[]`) scoped under the form id
//! - Built-in and custom filters, with references to other fields (`~{name}~`)
//!   and to other filters (`@trim`)
//! - Rule-based validation over filtered data, error classes on rendered fields
//! - Anti-forgery token and submission marker fields
//! - YAML form configuration
//!
//! ## Example
//! ```ignore
//! use formpipe::{Form, FormConfig, StaticSource, TagSettings};
//!
//! let config = FormConfig::from_yaml(r#"
//! id: signup
//! whitelist: [email]
//! filters:
//!   - callable: trim
//!     field: email
//! rules:
//!   email:
//!     - rule: required
//!     - rule: email
//! "#)?;
//!
//! let mut form = Form::new(config)?;
//! form.fetch(&source);
//! if form.is_valid() {
//!     let clean = form.filter();
//! }
//! let html = form.field("email", "email", &TagSettings::new());
//! ```

pub mod attributes;
pub mod config;
pub mod error;
pub mod filters;
pub mod form;
pub mod merge;
pub mod path;
pub mod pipeline;
pub mod reference;
pub mod source;
pub mod tags;
pub mod taxonomy;
pub mod validator;
pub mod value;

// --- Core types ---
pub use attributes::{AttributeSet, FieldDefaults};
pub use config::{CsrfToken, FormConfig, Method};
pub use error::{FilterError, FormError, FormResult};
pub use form::Form;
pub use path::{FieldPath, FieldStore};
pub use pipeline::{Pipeline, CSRF_KEY, SUBMITTED_KEY};
pub use tags::{ContentTransform, TagSettings};
pub use value::FormData;

// --- Extension points ---
pub use filters::{FilterArg, FilterRegistry, FilterSpec};
pub use reference::{FieldWrapper, ReferenceResolver};
pub use source::{RequestSource, StaticSource};
pub use validator::{ErrorMap, FieldRules, Rule, RuleValidator, Validator};

/// Build a form from a YAML configuration document.
pub fn parse_form(yaml: &str) -> FormResult<Form> {
    Form::new(FormConfig::from_yaml(yaml)?)
}
