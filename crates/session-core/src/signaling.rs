//! Outbound signaling

use async_trait::async_trait;

use crate::errors::Result;

/// An INVITE the session asks the signaling layer to send
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingInvite {
    pub call_id: String,
    /// Request URI of the invited party
    pub remote_uri: String,
    pub feature_tags: Vec<String>,
    pub accept_contact: Vec<String>,
    pub contribution_id: Option<String>,
    pub subject: Option<String>,
    /// SDP offer
    pub sdp: String,
    /// CPIM wrapped first message, sent alongside the SDP
    pub first_message: Option<String>,
    /// Resource list of a group invitation
    pub resource_list: Option<String>,
}

/// Sends SIP requests and responses on behalf of sessions
///
/// Answers, failures and remote BYEs travel the other way as events on
/// the [`SessionHandle`](crate::SessionHandle).
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send_invite(&self, invite: OutgoingInvite) -> Result<()>;

    /// Respond to the INVITE of `call_id`, with an SDP answer when accepting
    async fn send_response(&self, call_id: &str, status: u16, sdp: Option<String>) -> Result<()>;

    async fn send_bye(&self, call_id: &str) -> Result<()>;
}
