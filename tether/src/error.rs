//! Error types for tether.

use thiserror::Error;

/// Main error type for tether CLI operations.
#[derive(Error, Debug)]
pub enum TetherError {
    #[error("Daemon not reachable at {url}. Is tether-server running?")]
    ServerUnreachable { url: String },

    #[error("Daemon returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),
}
