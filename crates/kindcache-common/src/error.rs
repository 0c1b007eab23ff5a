//! Error types for kindcache
//!
//! Every cache operation reports failures through [`Error`]. There is no
//! retry layer: errors are deterministic given the inputs.

use crate::types::Kind;
use thiserror::Error;

/// Common result type for kindcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for kindcache
#[derive(Debug, Error)]
pub enum Error {
    #[error("record is nil: {0}")]
    NilInput(String),

    #[error("cannot resolve kind: {0}")]
    KindResolutionFailed(String),

    #[error("kind not found in the cache: {0}")]
    KindNotFound(Kind),

    #[error("unsupported selector: {0}")]
    UnsupportedSelector(String),

    #[error("malformed index target: {0}")]
    MalformedIndexTarget(String),

    #[error("index with name {0} does not exist")]
    IndexNotFound(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a nil input error
    pub fn nil_input(msg: impl Into<String>) -> Self {
        Self::NilInput(msg.into())
    }

    /// Create a kind resolution error
    pub fn kind_resolution(msg: impl Into<String>) -> Self {
        Self::KindResolutionFailed(msg.into())
    }

    /// Create an unsupported selector error
    pub fn unsupported_selector(msg: impl Into<String>) -> Self {
        Self::UnsupportedSelector(msg.into())
    }

    /// Create a malformed index target error
    pub fn malformed_index(msg: impl Into<String>) -> Self {
        Self::MalformedIndexTarget(msg.into())
    }

    /// Create an invalid selector error
    pub fn invalid_selector(msg: impl Into<String>) -> Self {
        Self::InvalidSelector(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KindNotFound(_) | Self::IndexNotFound(_))
    }

    /// Check if the error was caused by the caller's query
    #[must_use]
    pub fn is_invalid_query(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedSelector(_) | Self::InvalidSelector(_) | Self::IndexNotFound(_)
        )
    }
}
