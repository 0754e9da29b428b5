#![allow(dead_code)]

use thiserror::Error;

/// Typed error hierarchy for hubmirror.
///
/// Use at module boundaries (platform calls, reply engine, store schema).
/// Internal/leaf functions can continue using `anyhow::Result` — the
/// `Internal` variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Platform error: {platform}: {message}")]
    Platform { platform: String, message: String },

    #[error("Reply engine error: {0}")]
    Reply(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type MirrorResult<T> = std::result::Result<T, MirrorError>;

impl MirrorError {
    /// Whether the failed operation may succeed on redelivery of the event.
    pub fn is_transient(&self) -> bool {
        matches!(self, MirrorError::Platform { .. } | MirrorError::Reply(_))
    }
}
