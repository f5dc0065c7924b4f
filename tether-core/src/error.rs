//! Error types for tether-core.

use thiserror::Error;

/// Result type alias using tether-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for companion lifecycle operations
#[derive(Error, Debug)]
pub enum Error {
    // Gateway errors
    #[error("Gateway call `{op}` timed out after {after_ms}ms")]
    AdapterTimeout { op: &'static str, after_ms: u64 },

    #[error("Gateway rejected `{op}`: {reason}")]
    AdapterRejected { op: &'static str, reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    // Store errors
    #[error("Mapping store unreadable: {0}")]
    StoreCorrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a gateway rejection error
    pub fn rejected(op: &'static str, reason: impl Into<String>) -> Self {
        Self::AdapterRejected {
            op,
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(op: &'static str, after_ms: u64) -> Self {
        Self::AdapterTimeout { op, after_ms }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AdapterTimeout { .. })
    }

    /// Errors the sweeper or a later notification can heal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AdapterTimeout { .. } | Self::AdapterRejected { .. } | Self::NotFound { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
