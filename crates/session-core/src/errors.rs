//! Error types for the session layer

use thiserror::Error;

use rcs_message_core::CodecError;
use rcs_msrp_core::MsrpError;

use crate::request::status;
use crate::types::TerminationReason;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur in the session layer
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// CPIM or resume-info envelope is structurally broken
    #[error("Malformed envelope: {message}")]
    MalformedEnvelope { message: String },

    /// Document lacks required content
    #[error("Malformed document: {message}")]
    MalformedDocument { message: String },

    /// The invitation does not identify its sender
    #[error("Missing sender identity: {message}")]
    MissingSenderIdentity { message: String },

    /// Content type without a codec
    #[error("Unsupported MIME type: {mime_type}")]
    UnsupportedMimeType { mime_type: String },

    /// Maximum number of concurrent sessions reached
    #[error("Maximum number of sessions reached ({max})")]
    CapacityExceeded { max: usize },

    /// MSRP transport failure
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Signaling failure
    #[error("Signaling error: {message}")]
    Signaling { message: String },

    /// Unsupported trigger action
    #[error("Unsupported action: {action}")]
    UnsupportedAction { action: String },

    /// Operation not allowed in the current state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// No session with this id
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SessionError {
    /// Create a missing sender identity error
    pub fn missing_sender_identity(message: impl Into<String>) -> Self {
        Self::MissingSenderIdentity {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a signaling error
    pub fn signaling(message: impl Into<String>) -> Self {
        Self::Signaling {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a session not found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// How a session ends when this error hits it
    pub fn termination_reason(&self) -> TerminationReason {
        match self {
            SessionError::Transport { .. } => TerminationReason::MediaFailed,
            _ => TerminationReason::BySystem,
        }
    }

    /// Response status used when this error rejects an invitation
    pub fn response_status(&self) -> u16 {
        match self {
            SessionError::CapacityExceeded { .. } => status::BUSY_HERE,
            SessionError::UnsupportedMimeType { .. } => status::UNSUPPORTED_MEDIA_TYPE,
            SessionError::MalformedEnvelope { .. }
            | SessionError::MalformedDocument { .. }
            | SessionError::MissingSenderIdentity { .. } => status::BAD_REQUEST,
            _ => status::SERVER_INTERNAL_ERROR,
        }
    }
}

impl From<CodecError> for SessionError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::MalformedEnvelope { message } => SessionError::MalformedEnvelope { message },
            CodecError::MalformedDocument { message } => SessionError::MalformedDocument { message },
            CodecError::UnsupportedMimeType { mime_type } => SessionError::UnsupportedMimeType { mime_type },
        }
    }
}

impl From<MsrpError> for SessionError {
    fn from(error: MsrpError) -> Self {
        SessionError::transport(error.to_string())
    }
}
