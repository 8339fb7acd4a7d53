//! Error types and handling
//!
//! Hard failures only. A lifecycle operation attempted from the wrong state is
//! not an error: it comes back as a declined outcome carrying the observed state
//! (see [`crate::services::lifecycle`]).

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Network or connection failure talking to the CA or PuppetDB
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered, but the payload is not what the API promises
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Local artifact read/write failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certname that cannot be used as a Puppet node identity
    #[error("Invalid certname: {0}")]
    InvalidCertname(String),

    /// Artifact kind and path disagree, or an unrecognized kind name was given
    #[error("Unknown artifact kind: {0}")]
    UnknownArtifactKind(String),

    /// The CA rejected a certificate signing request submission
    #[error("Enrollment error: {0}")]
    Enrollment(String),

    /// Key or CSR generation failure
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl AppError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable identifier used in JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Transport(_) => "transport_error",
            AppError::MalformedResponse(_) => "malformed_response",
            AppError::Io { .. } => "io_error",
            AppError::Config(_) => "config_error",
            AppError::InvalidCertname(_) => "invalid_certname",
            AppError::UnknownArtifactKind(_) => "unknown_artifact_kind",
            AppError::Enrollment(_) => "enrollment_error",
            AppError::Crypto(_) => "crypto_error",
        }
    }
}

/// Error body printed by the CLI in `--json` mode
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse::new(err.kind(), err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Transport(format!("request timed out: {}", err))
        } else if err.is_connect() {
            AppError::Transport(format!("connection failed: {}", err))
        } else {
            AppError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedResponse(format!("JSON parsing error: {}", err))
    }
}

/// Result type alias used across the crate
pub type AppResult<T> = Result<T, AppError>;
