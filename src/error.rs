use thiserror::Error;

pub type FormResult<T> = Result<T, FormError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormError {
    #[error("Invalid submit method '{method}'. Expected one of: POST, GET")]
    InvalidMethod { method: String },

    #[error("Invalid field path '{path}': {reason}")]
    InvalidFieldPath { path: String, reason: String },

    #[error("Invalid field wrapper: {0}")]
    InvalidFieldWrapper(String),

    #[error("Invalid validation rule for field '{field}': {reason}")]
    InvalidRule { field: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl From<serde_yaml::Error> for FormError {
    fn from(err: serde_yaml::Error) -> Self {
        FormError::DeserializationError(err.to_string())
    }
}

/// Failure raised by a single filter invocation.
///
/// Never crosses the pipeline boundary: the pipeline logs it and keeps the
/// target field's previous value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Filter '{filter}' expects at least {expected} argument(s), got {got}")]
    MissingArgument {
        filter: String,
        expected: usize,
        got: usize,
    },

    #[error("Filter '{filter}' cannot handle argument {index}: expected {expected}")]
    InvalidArgument {
        filter: String,
        index: usize,
        expected: String,
    },

    #[error("Filter '{filter}' failed: {message}")]
    Failed { filter: String, message: String },
}

impl FilterError {
    pub fn failed(filter: &str, message: impl Into<String>) -> Self {
        FilterError::Failed {
            filter: filter.to_string(),
            message: message.into(),
        }
    }
}
