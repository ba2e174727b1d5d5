use thiserror::Error;

use crate::types::SourceKind;

#[derive(Debug, Error)]
pub enum Error {
    /// One retrieval source failed or missed the deadline. Recoverable: the
    /// orchestrator ranks over the remaining sources.
    #[error("{kind} source unavailable: {reason}")]
    SourceUnavailable { kind: SourceKind, reason: String },

    #[error("no retrieval sources available")]
    NoSourcesAvailable,

    /// Query or stored vector does not match the index dimension.
    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn unavailable(kind: SourceKind, reason: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable { kind, reason: reason.to_string() }
    }

    /// Errors that abort the whole query instead of degrading one source.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::NoSourcesAvailable)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
