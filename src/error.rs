//! Error types for the cloudlet sender.
//!
//! The radio protocol itself has no error taxonomy: malformed inbound messages are
//! dropped and lost frames are never reported. The errors here cover the parts a
//! host process can act on, such as a channel that refuses to send, a handshake that
//! never completes, or a field layout that cannot be honoured.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use cloudlet::CloudletError;
//! use std::time::Duration;
//!
//! let error = CloudletError::HandshakeTimeout { duration: Duration::from_secs(30) };
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for cloudlet operations.
pub type Result<T, E = CloudletError> = std::result::Result<T, E>;

/// Main error type for cloudlet operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CloudletError {
    #[error("Radio channel error: {reason}")]
    Channel {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("No handshake reply after {duration:?}")]
    HandshakeTimeout { duration: Duration },

    #[error("Session request cancelled before a handshake reply arrived")]
    Cancelled,

    #[error("Invalid field layout: {reason}")]
    InvalidFields { reason: String },

    #[error("'{key}' is not a selectable field key")]
    InvalidFieldKey { key: String },

    #[error("No field keys configured")]
    FieldsNotConfigured,

    #[error("Failed to serialize sample record")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error in {path}: {details}")]
    Config { path: PathBuf, details: String },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("A session is already in progress")]
    SessionBusy,

    #[error("No session is streaming")]
    NoSession,
}

impl CloudletError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            CloudletError::Channel { .. } => true,
            CloudletError::HandshakeTimeout { .. } => true,
            CloudletError::SessionBusy => true,
            CloudletError::NoSession => false,
            CloudletError::Io(_) => true,
            CloudletError::Cancelled => false,
            CloudletError::InvalidFields { .. } => false,
            CloudletError::InvalidFieldKey { .. } => false,
            CloudletError::FieldsNotConfigured => false,
            CloudletError::Serialization(_) => false,
            CloudletError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            CloudletError::Channel { .. } => vec![
                "Check the radio group and port match the collector",
                "Verify the network interface allows broadcast",
            ],
            CloudletError::HandshakeTimeout { .. } => vec![
                "Ensure a collector is listening on the same group",
                "Increase handshake_timeout_ms",
                "Check the collector replies to this device identity",
            ],
            CloudletError::Cancelled => vec!["Request a new session when ready"],
            CloudletError::InvalidFields { .. } | CloudletError::InvalidFieldKey { .. } => vec![
                "Select between one and four distinct keys",
                "Use lowercase letters a-z other than the reserved 'n'",
            ],
            CloudletError::FieldsNotConfigured => {
                vec!["Call configure_fields before building records"]
            }
            CloudletError::Serialization(_) => vec!["Check sample values are plain numbers"],
            CloudletError::Config { .. } => vec![
                "Check the configuration file is valid YAML",
                "Compare field names against the documented options",
            ],
            CloudletError::Io(_) => vec!["Check file permissions and socket availability"],
            CloudletError::SessionBusy => {
                vec!["Wait for the current session to send its terminator frame"]
            }
            CloudletError::NoSession => {
                vec!["Emit records from the sample producer while a session streams"]
            }
        }
    }

    /// Helper constructor for channel errors.
    pub fn channel_failed(reason: impl Into<String>) -> Self {
        CloudletError::Channel { reason: reason.into(), source: None }
    }

    /// Helper constructor for channel errors with source.
    pub fn channel_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        CloudletError::Channel { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for invalid field layouts.
    pub fn invalid_fields(reason: impl Into<String>) -> Self {
        CloudletError::InvalidFields { reason: reason.into() }
    }

    /// Helper constructor for configuration errors with path context.
    pub fn config_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        CloudletError::Config { path: path.into(), details: details.into() }
    }
}
