//! Session layer of the RCS messaging engine
//!
//! This crate drives chat, file-transfer, IP call and generic SIP/MSRP
//! sessions through their lifecycle:
//!
//! - **Invitations**: first-message and participant extraction from an
//!   incoming INVITE, group detection, referred identity resolution
//! - **Negotiation**: MSRP SDP offer/answer and setup role selection
//! - **Sessions**: one task per session owning its state, its MSRP
//!   transport and its activity monitor
//! - **Registry**: bounded set of live sessions with self-deregistration
//!
//! Signaling itself is delegated to a [`SignalingChannel`] implementation
//! and the media connection to an [`MsrpConnector`](rcs_msrp_core::MsrpConnector).

pub mod errors;
pub mod config;
pub mod logging;
pub mod types;
pub mod sdp;
pub mod request;
pub mod signaling;
pub mod listener;
pub mod invitation;
pub mod resume;
pub mod session;
pub mod registry;
pub mod service;

pub use errors::{Result, SessionError};
pub use config::RcsConfig;
pub use types::{SessionId, SessionInfo, SessionKind, SessionRole, SessionState, TerminationReason};
pub use request::{status, InviteRequest};
pub use signaling::{OutgoingInvite, SignalingChannel};
pub use listener::SessionListener;
pub use session::SessionHandle;
pub use registry::{RegistryStats, SessionRegistry};
pub use service::SessionService;
pub use resume::{FileTransferResume, ResumeInfoStore};
pub use logging::{setup_logging, LoggingConfig};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        InviteRequest, OutgoingInvite, RcsConfig, Result, SessionError, SessionHandle, SessionId,
        SessionInfo, SessionKind, SessionListener, SessionRegistry, SessionRole, SessionService,
        SessionState, SignalingChannel, TerminationReason,
    };
    pub use rcs_message_core::prelude::*;
    pub use rcs_msrp_core::{MsrpConnector, SetupRole, TcpConnector};
}
