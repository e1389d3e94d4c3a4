//! Session event listeners

use rcs_message_core::{ChatMessage, ImdnReport};

use crate::errors::SessionError;
use crate::types::{SessionId, TerminationReason};

/// Receives session events
///
/// Callbacks run on the session task and must not block. Every method
/// has an empty default so listeners implement only what they need.
pub trait SessionListener: Send + Sync {
    fn on_session_started(&self, _session_id: &SessionId) {}

    /// Raw payload of a received MSRP message
    fn on_data_received(&self, _session_id: &SessionId, _message_id: &str, _data: &[u8], _content_type: Option<&str>) {}

    /// Decoded chat message
    fn on_message_received(&self, _session_id: &SessionId, _message: &ChatMessage) {}

    fn on_delivery_report(&self, _session_id: &SessionId, _report: &ImdnReport) {}

    /// Every chunk of a sent message was acknowledged
    fn on_data_transferred(&self, _session_id: &SessionId, _message_id: &str) {}

    fn on_session_error(&self, _session_id: &SessionId, _error: &SessionError) {}

    fn on_session_terminated(&self, _session_id: &SessionId, _reason: TerminationReason) {}
}
