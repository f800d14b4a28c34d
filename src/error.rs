use thiserror::Error;

use crate::model::Recovery;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum IntrospectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse failure: {details}")]
    ParseFailure { details: String },

    #[error("Malformed document at byte {position}: {details}")]
    MalformedDocument { position: u64, details: String },

    #[error("Document too large: more than {limit} elements")]
    TooLarge { limit: usize },

    #[error("Operation timeout: {operation} after {timeout_seconds} seconds")]
    OperationTimeout {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("Unresolved references: {}", ids.join(", "))]
    ReferenceUnresolved { ids: Vec<String> },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Schema generation error: {details}")]
    SchemaGeneration { details: String },

    #[error("External validator error: {details}")]
    ExternalValidator { details: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

impl IntrospectError {
    /// Errors that end the invocation. A malformed tail is reported and the
    /// partial result kept; `ReferenceUnresolved` only surfaces as an error
    /// under strict references, where it ends the invocation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, IntrospectError::MalformedDocument { .. })
    }

    /// Timeouts are reported apart from parse errors so callers can retry
    /// with different parameters, e.g. a forced streaming walk
    pub fn is_timeout(&self) -> bool {
        matches!(self, IntrospectError::OperationTimeout { .. })
    }

    /// The non-fatal error a walker recovered from, if the recovery was one
    pub fn from_recovery(recovery: &Recovery) -> Option<Self> {
        match recovery {
            Recovery::Malformed { position, details } => Some(IntrospectError::MalformedDocument {
                position: *position,
                details: details.clone(),
            }),
            Recovery::Truncated { .. } => None,
        }
    }
}

impl From<crate::config::ConfigError> for IntrospectError {
    fn from(err: crate::config::ConfigError) -> Self {
        IntrospectError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, IntrospectError>;
