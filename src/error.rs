use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the annotation core.
///
/// Only `Validation` is expected during normal interactive use; it never comes
/// with a state mutation. `Io` and `Decode` abort the current operation but
/// leave the session running. `Consistency` marks a broken internal invariant.
#[derive(Debug, Error)]
pub enum AnnotatorError {
    #[error("{0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing media or dataset: {0}")]
    Missing(PathBuf),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("cancelled")]
    Cancelled,
}

impl AnnotatorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AnnotatorError::Validation(msg.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AnnotatorError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AnnotatorError::Validation(_))
    }
}

pub type AnnotatorResult<T> = std::result::Result<T, AnnotatorError>;
