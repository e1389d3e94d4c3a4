//! Error types for the message codecs

use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while building or parsing message payloads
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The envelope structure itself is broken (missing header blocks, bad XML syntax)
    #[error("Malformed envelope: {message}")]
    MalformedEnvelope { message: String },

    /// The document is well formed but lacks required content
    #[error("Malformed document: {message}")]
    MalformedDocument { message: String },

    /// No codec is registered for the MIME type
    #[error("Unsupported MIME type: {mime_type}")]
    UnsupportedMimeType { mime_type: String },
}

impl CodecError {
    /// Create a malformed envelope error
    pub fn malformed_envelope(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            message: message.into(),
        }
    }

    /// Create a malformed document error
    pub fn malformed_document(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }

    /// Create an unsupported MIME type error
    pub fn unsupported_mime_type(mime_type: impl Into<String>) -> Self {
        Self::UnsupportedMimeType {
            mime_type: mime_type.into(),
        }
    }
}
