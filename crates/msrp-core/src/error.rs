//! Error types for the MSRP transport

use thiserror::Error;

/// Result type for MSRP operations
pub type Result<T> = std::result::Result<T, MsrpError>;

/// Errors raised by the MSRP transport
#[derive(Debug, Error)]
pub enum MsrpError {
    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent something that is not MSRP
    #[error("MSRP protocol error: {message}")]
    Protocol { message: String },

    /// An MSRP URI could not be parsed
    #[error("Invalid MSRP path: {path}")]
    InvalidPath { path: String },

    /// Message exceeds the negotiated maximum size
    #[error("Message of {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// The connection could not be established
    #[error("Failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    /// The session has been closed
    #[error("MSRP session closed")]
    Closed,
}

impl MsrpError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Create a connect error
    pub fn connect(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            address: address.into(),
            message: message.into(),
        }
    }
}
