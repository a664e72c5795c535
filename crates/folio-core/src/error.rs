use thiserror::Error;

use crate::component::ComponentName;

/// Errors raised by the document engine.
///
/// `NotImplemented`, `AlreadyRegistered` and `Configuration` are authoring
/// errors surfaced at setup time. The remaining variants report a broken
/// document invariant while planning or executing an operation; the
/// transaction that hit them is rolled back.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("{class} does not implement {method}")]
    NotImplemented {
        class: &'static str,
        method: &'static str,
    },

    #[error("{kind} `{name}` is already registered")]
    AlreadyRegistered { kind: &'static str, name: String },

    #[error("extension `{extension}` is misconfigured: {message}")]
    Configuration { extension: String, message: String },

    #[error("no component named `{0}`")]
    UnknownComponent(ComponentName),

    #[error("component class `{0}` is not registered")]
    UnknownComponentClass(String),

    #[error("index {index} out of range for `{container}` with {len} children")]
    IndexOutOfRange {
        container: String,
        index: usize,
        len: usize,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl EditorError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EditorError::InvalidOperation(message.into())
    }
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
