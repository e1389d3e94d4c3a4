//! Chat messages exchanged over a session

use uuid::Uuid;

use crate::contact::ContactId;
use crate::error::{CodecError, Result};
use crate::geoloc::Geoloc;
use crate::mime;

/// Generate a globally unique message id
pub fn generate_message_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// How the content of a message is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// UTF-8 text
    Text,
    /// Persisted geolocation string
    Geoloc,
    /// File-transfer-over-HTTP info document
    FileTransferInfo,
}

impl MessageKind {
    /// Kind of a network MIME type
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        if mime::is_text_plain(mime_type) {
            Some(MessageKind::Text)
        } else if mime::is_geoloc(mime_type) || mime_type.trim().eq_ignore_ascii_case(mime::GEOLOC_API) {
            Some(MessageKind::Geoloc)
        } else if mime::is_file_transfer_http(mime_type) {
            Some(MessageKind::FileTransferInfo)
        } else {
            None
        }
    }

    /// MIME type exposed through the messaging API
    pub fn api_mime_type(&self) -> &'static str {
        match self {
            MessageKind::Text => mime::TEXT_PLAIN,
            MessageKind::Geoloc => mime::GEOLOC_API,
            MessageKind::FileTransferInfo => mime::FILE_TRANSFER_HTTP,
        }
    }

    /// MIME type sent on the network
    pub fn network_mime_type(&self) -> &'static str {
        match self {
            MessageKind::Text => mime::TEXT_PLAIN,
            MessageKind::Geoloc => mime::GEOLOC_NETWORK,
            MessageKind::FileTransferInfo => mime::FILE_TRANSFER_HTTP,
        }
    }
}

/// An immutable chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    message_id: String,
    remote: ContactId,
    content: String,
    kind: MessageKind,
    timestamp: i64,
    timestamp_sent: i64,
    display_name: Option<String>,
}

impl ChatMessage {
    pub fn new(
        message_id: impl Into<String>,
        remote: ContactId,
        content: impl Into<String>,
        kind: MessageKind,
        timestamp: i64,
        timestamp_sent: i64,
        display_name: Option<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            remote,
            content: content.into(),
            kind,
            timestamp,
            timestamp_sent,
            display_name,
        }
    }

    /// A text message with a fresh id
    pub fn text(remote: ContactId, text: impl Into<String>, timestamp: i64, timestamp_sent: i64) -> Self {
        Self::new(generate_message_id(), remote, text, MessageKind::Text, timestamp, timestamp_sent, None)
    }

    /// A geolocation message with a fresh id
    pub fn geoloc(remote: ContactId, geoloc: &Geoloc, timestamp: i64, timestamp_sent: i64) -> Self {
        Self::new(
            generate_message_id(),
            remote,
            geoloc.to_string(),
            MessageKind::Geoloc,
            timestamp,
            timestamp_sent,
            None,
        )
    }

    /// A file-transfer info message with a fresh id
    pub fn file_transfer(remote: ContactId, info: impl Into<String>, timestamp: i64, timestamp_sent: i64) -> Self {
        Self::new(
            generate_message_id(),
            remote,
            info,
            MessageKind::FileTransferInfo,
            timestamp,
            timestamp_sent,
            None,
        )
    }

    /// Build a message from content typed with an API MIME type
    pub fn from_api_mime_type(
        message_id: impl Into<String>,
        api_mime_type: &str,
        content: impl Into<String>,
        remote: ContactId,
        display_name: Option<String>,
        timestamp: i64,
        timestamp_sent: i64,
    ) -> Result<Self> {
        let kind = if api_mime_type.trim().eq_ignore_ascii_case(mime::GEOLOC_API) {
            MessageKind::Geoloc
        } else if mime::is_text_plain(api_mime_type) {
            MessageKind::Text
        } else {
            return Err(CodecError::unsupported_mime_type(api_mime_type));
        };
        Ok(Self::new(message_id, remote, content, kind, timestamp, timestamp_sent, display_name))
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn remote(&self) -> &ContactId {
        &self.remote
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind.api_mime_type()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn timestamp_sent(&self) -> i64 {
        self.timestamp_sent
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}
