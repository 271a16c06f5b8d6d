//! Error types for frame streaming and buffering.
//!
//! All errors implement `std::error::Error` and carry enough structured context
//! to decide whether the failing operation can simply be invoked again.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: binding the datagram socket or an unexpected socket
//!   failure while receiving. These stop the current connection only.
//! - **File Errors**: clip files that are missing or unreadable.
//! - **Decode/Encode Errors**: corrupt datagrams or clip blobs. A bad datagram
//!   costs one frame, never the receive loop.
//! - **Lookup Errors**: operating on a data-set that has no installed queue.
//! - **Config Errors**: invalid engine configuration.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use mocap_live::StreamError;
//!
//! let error = StreamError::connection_failed("port 14043 already in use");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::DataSetId;

/// Result type alias for streaming operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for streaming operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Failed to connect to capture stream: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Socket error during {operation}")]
    Socket {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Clip file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decode error in {context}: {details}")]
    Decode { context: String, details: String },

    #[error("Encode error in {context}: {details}")]
    Encode { context: String, details: String },

    #[error("No frames installed for data-set {id}")]
    UnknownDataSet { id: DataSetId },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Background worker error: {reason}")]
    Worker {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Connection { .. } => true,
            StreamError::Socket { .. } => true,
            StreamError::Worker { .. } => true,
            StreamError::File { .. } => false,
            StreamError::Decode { .. } => false,
            StreamError::Encode { .. } => false,
            StreamError::UnknownDataSet { .. } => false,
            StreamError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::Connection { .. } | StreamError::Socket { .. } => vec![
                "Check that no other application is bound to the streaming port",
                "Verify the capture application is streaming to this host and port",
                "Call connect again once the port is free",
            ],
            StreamError::File { .. } => vec![
                "Check the clip file exists and is readable",
                "Verify the file was written by a compatible recorder",
                "Check file permissions",
            ],
            StreamError::Decode { .. } => vec![
                "Verify the sender uses the expected LZ4 + JSON frame format",
                "Check the clip file is not truncated",
            ],
            StreamError::Encode { .. } => vec![
                "Check the frames contain serializable values",
                "Ensure sufficient disk space",
            ],
            StreamError::UnknownDataSet { .. } => vec![
                "Connect the data-set before reading or saving it",
                "Check the data-set was not garbage collected",
            ],
            StreamError::Config { .. } => vec![
                "Check the configuration values are non-zero",
                "Compare against EngineConfig::default()",
            ],
            StreamError::Worker { .. } => vec![
                "Check system thread limits",
                "Disconnect and connect again",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        StreamError::File { path, source }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        StreamError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for socket failures.
    pub fn socket_error(operation: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::Socket { operation: operation.into(), source }
    }

    /// Helper constructor for decode failures.
    pub fn decode_error(context: impl Into<String>, details: impl ToString) -> Self {
        StreamError::Decode { context: context.into(), details: details.to_string() }
    }

    /// Helper constructor for encode failures.
    pub fn encode_error(context: impl Into<String>, details: impl ToString) -> Self {
        StreamError::Encode { context: context.into(), details: details.to_string() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(reason: impl Into<String>) -> Self {
        StreamError::Config { reason: reason.into() }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
