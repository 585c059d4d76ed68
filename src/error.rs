//! Custom error types for Neewer light control.
//!
//! This module provides fine-grained error handling for serial communication,
//! the daemon socket protocol, and state persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for light control operations.
#[derive(Error, Debug)]
pub enum NeewerError {
    /// Serial port could not be opened or written.
    #[error("Serial device unavailable on {port}: {reason}. Check the USB connection and port.")]
    DeviceUnavailable { port: String, reason: String },

    /// The daemon socket could not be dialed.
    #[error(
        "Daemon unreachable at {}: {source}. Start it first with `neewerctl daemon start` or `neewerctl daemon run`.",
        path.display()
    )]
    DaemonUnreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bytes that should be a frame are not one.
    #[error("Malformed frame: {message}")]
    MalformedFrame { message: String },

    /// Client closed the connection before sending a full request.
    #[error("Incomplete request: expected {expected} bytes, received {received}")]
    IncompleteRequest { expected: usize, received: usize },

    /// Client disconnected while its request waited to be served.
    #[error("Client hung up before its {request} request was served")]
    ClientHungUp { request: &'static str },

    /// Short or garbled reply from the daemon.
    #[error("Invalid response from daemon: {message}")]
    InvalidResponse { message: String },

    /// State file could not be read or written.
    #[error("Failed to persist state at {}: {message}", path.display())]
    PersistenceFailure { path: PathBuf, message: String },

    /// The daemon socket could not be bound or served.
    #[error("Socket listener failure at {}: {source}", path.display())]
    ListenerFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic invalid input error.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Socket I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NeewerError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        NeewerError::PersistenceFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn listener(path: &std::path::Path, source: std::io::Error) -> Self {
        NeewerError::ListenerFailure {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn device(port: &str, reason: impl std::fmt::Display) -> Self {
        NeewerError::DeviceUnavailable {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for light control operations.
pub type Result<T> = std::result::Result<T, NeewerError>;
