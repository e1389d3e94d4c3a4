//! Core session types

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rcs_message_core::{
    feature_tags, mime, CapabilityConfig, ChatMessage, ContactId, ParticipantStatus, ResumeInfo,
};

/// Unique identifier for a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("session-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    ByUser,
    ByRemote,
    BySystem,
    ByTimeout,
    ByInactivity,
    MediaFailed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationReason::ByUser => "by user",
            TerminationReason::ByRemote => "by remote",
            TerminationReason::BySystem => "by system",
            TerminationReason::ByTimeout => "by timeout",
            TerminationReason::ByInactivity => "by inactivity",
            TerminationReason::MediaFailed => "media failed",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, nothing sent yet
    Idle,
    /// Offer sent, waiting for the answer
    Offering,
    /// Offer received, answering
    Answering,
    /// Negotiation done, opening the MSRP connection
    EstablishingMedia,
    Active,
    Terminating,
    Terminated(TerminationReason),
}

impl SessionState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionState::Terminated(_))
    }

    /// Terminating or terminated
    pub fn is_ending(&self) -> bool {
        matches!(self, SessionState::Terminating | SessionState::Terminated(_))
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Terminated(_), _) => false,
            (Terminating, Terminated(_)) => true,
            (Terminating, _) => false,
            (_, Terminating) => true,
            (Idle, Offering) | (Idle, Answering) => true,
            (Offering, EstablishingMedia) | (Answering, EstablishingMedia) => true,
            // sessions without MSRP media go straight to active
            (Offering, Active) | (Answering, Active) => true,
            (EstablishingMedia, Active) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Offering => write!(f, "Offering"),
            SessionState::Answering => write!(f, "Answering"),
            SessionState::EstablishingMedia => write!(f, "EstablishingMedia"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Terminating => write!(f, "Terminating"),
            SessionState::Terminated(reason) => write!(f, "Terminated ({})", reason),
        }
    }
}

/// Which side initiated the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionRole {
    /// We sent the INVITE
    Originating,
    /// We received the INVITE
    Terminating,
}

/// Session flavours and the data specific to each
#[derive(Debug, Clone, PartialEq)]
pub enum SessionKind {
    /// One-to-one or group chat
    Chat {
        group: bool,
        participants: HashMap<ContactId, ParticipantStatus>,
        first_message: Option<ChatMessage>,
        contribution_id: Option<String>,
    },
    /// Application-defined session identified by a feature tag
    GenericSipMsrp {
        feature_tag: String,
        accept_types: Vec<String>,
    },
    /// Voice or video call; media runs outside MSRP
    IpCall { video: bool },
    FileTransfer {
        file_type: String,
        resume: Option<ResumeInfo>,
    },
}

impl SessionKind {
    /// A one-to-one chat without first message
    pub fn one_to_one_chat() -> Self {
        SessionKind::Chat {
            group: false,
            participants: HashMap::new(),
            first_message: None,
            contribution_id: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionKind::Chat { group: false, .. } => "chat",
            SessionKind::Chat { group: true, .. } => "group chat",
            SessionKind::GenericSipMsrp { .. } => "generic SIP/MSRP",
            SessionKind::IpCall { .. } => "IP call",
            SessionKind::FileTransfer { .. } => "file transfer",
        }
    }

    /// Whether the session carries an MSRP connection
    pub fn uses_msrp(&self) -> bool {
        !matches!(self, SessionKind::IpCall { .. })
    }

    /// Whether payloads are CPIM wrapped chat messages
    pub fn decodes_cpim(&self) -> bool {
        matches!(self, SessionKind::Chat { .. })
    }

    /// `a=accept-types` of the local SDP
    pub fn accept_types(&self) -> Vec<String> {
        match self {
            SessionKind::Chat { .. } => vec![mime::CPIM.to_string(), mime::IS_COMPOSING.to_string()],
            SessionKind::GenericSipMsrp { accept_types, .. } => accept_types.clone(),
            SessionKind::IpCall { .. } => Vec::new(),
            SessionKind::FileTransfer { file_type, .. } => vec![file_type.clone()],
        }
    }

    /// `a=accept-wrapped-types` of the local SDP
    pub fn wrapped_types(&self, capabilities: &CapabilityConfig) -> Vec<String> {
        match self {
            SessionKind::Chat { .. } => {
                let mut types = vec![mime::TEXT_PLAIN.to_string(), mime::IMDN.to_string()];
                if capabilities.geolocation_push {
                    types.push(mime::GEOLOC_NETWORK.to_string());
                }
                if capabilities.file_transfer_http {
                    types.push(mime::FILE_TRANSFER_HTTP.to_string());
                }
                types
            }
            _ => Vec::new(),
        }
    }

    /// Feature tags placed in the Contact and Accept-Contact headers
    pub fn feature_tags(&self, capabilities: &CapabilityConfig) -> Vec<String> {
        match self {
            SessionKind::Chat { group: false, .. } => feature_tags::supported_feature_tags(capabilities),
            SessionKind::Chat { group: true, .. } => feature_tags::supported_group_feature_tags(capabilities),
            SessionKind::GenericSipMsrp { feature_tag, .. } => vec![feature_tag.clone()],
            SessionKind::IpCall { video } => feature_tags::ip_call_feature_tags(*video),
            SessionKind::FileTransfer { .. } => feature_tags::supported_feature_tags(&CapabilityConfig {
                file_transfer: true,
                ..Default::default()
            }),
        }
    }
}

/// Immutable description of a session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub role: SessionRole,
    pub kind: SessionKind,
    pub remote: ContactId,
    pub call_id: String,
    pub created_at: DateTime<Utc>,
}
