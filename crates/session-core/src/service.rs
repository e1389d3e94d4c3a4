//! Entry point for starting and receiving sessions

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use rcs_message_core::{datetime, ChatMessage, ContactId, ParticipantStatus};
use rcs_msrp_core::MsrpConnector;

use crate::config::RcsConfig;
use crate::errors::{Result, SessionError};
use crate::invitation;
use crate::listener::SessionListener;
use crate::logging;
use crate::registry::SessionRegistry;
use crate::request::{status, InviteRequest};
use crate::session::{Session, SessionContext, SessionHandle};
use crate::signaling::SignalingChannel;
use crate::types::{SessionId, SessionInfo, SessionKind, SessionRole, SessionState, TerminationReason};

/// Creates sessions and keeps track of them
pub struct SessionService {
    config: Arc<RcsConfig>,
    registry: SessionRegistry,
    signaling: Arc<dyn SignalingChannel>,
    connector: Arc<dyn MsrpConnector>,
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

impl SessionService {
    pub fn new(
        config: RcsConfig,
        signaling: Arc<dyn SignalingChannel>,
        connector: Arc<dyn MsrpConnector>,
    ) -> Result<Self> {
        config.validate()?;
        logging::log_engine_config(&config);
        Ok(Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
            signaling,
            connector,
            listeners: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &RcsConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Listen to every session created from now on
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.write().push(listener);
    }

    fn context(&self) -> SessionContext {
        SessionContext {
            config: self.config.clone(),
            signaling: self.signaling.clone(),
            connector: self.connector.clone(),
            listeners: Arc::new(self.listeners.read().clone()),
            registry: self.registry.downgrade(),
        }
    }

    fn session_info(&self, role: SessionRole, kind: SessionKind, remote: ContactId, call_id: String) -> SessionInfo {
        SessionInfo {
            id: SessionId::new(),
            role,
            kind,
            remote,
            call_id,
            created_at: Utc::now(),
        }
    }

    /// Invite `remote` to a session of the given kind
    pub async fn initiate_session(&self, remote: ContactId, kind: SessionKind) -> Result<SessionHandle> {
        let call_id = format!("{}@{}", uuid::Uuid::new_v4().simple(), self.config.local_ip_address);
        let info = self.session_info(SessionRole::Originating, kind, remote, call_id);
        let (handle, session) = Session::new(info, self.context(), None);

        self.registry.admit(handle.clone(), self.config.max_sessions).await?;
        session.spawn();
        info!("Initiated {} session {}", handle.info().kind.name(), handle.id());
        Ok(handle)
    }

    /// Invite `remote` to a one-to-one chat, optionally carrying a first message
    pub async fn initiate_chat_session(
        &self,
        remote: ContactId,
        first_message: Option<ChatMessage>,
    ) -> Result<SessionHandle> {
        let kind = SessionKind::Chat {
            group: false,
            participants: HashMap::new(),
            first_message,
            contribution_id: None,
        };
        self.initiate_session(remote, kind).await
    }

    async fn reject(&self, request: &InviteRequest, code: u16) {
        debug!("Rejecting invitation {} with {}", request.call_id, code);
        if let Err(e) = self.signaling.send_response(&request.call_id, code, None).await {
            warn!("Failed to reject invitation {}: {}", request.call_id, e);
        }
    }

    async fn reject_when_full(&self, request: &InviteRequest) -> Result<()> {
        let max_sessions = self.config.max_sessions;
        if self.registry.is_full(max_sessions).await {
            warn!(
                "Maximum number of sessions reached, rejecting invitation {}",
                request.call_id
            );
            self.registry.record_rejection().await;
            self.reject(request, status::BUSY_HERE).await;
            return Err(SessionError::CapacityExceeded { max: max_sessions });
        }
        Ok(())
    }

    /// Accept an incoming invitation as a session of the given kind
    ///
    /// When the registry is full the invitation is answered `486 Busy Here`
    /// and no session is created.
    pub async fn receive_invitation(&self, request: InviteRequest, kind: SessionKind) -> Result<SessionHandle> {
        self.reject_when_full(&request).await?;

        let Some(remote) = invitation::referred_identity_as_contact(&request)
            .or_else(|| ContactId::from_uri(&request.from))
        else {
            let error = SessionError::missing_sender_identity(format!(
                "cannot resolve the sender of invitation {}",
                request.call_id
            ));
            self.reject(&request, error.response_status()).await;
            return Err(error);
        };

        let offer = request.sdp_offer();
        let info = self.session_info(SessionRole::Terminating, kind, remote, request.call_id.clone());
        let (handle, session) = Session::new(info, self.context(), offer);

        if let Err(error) = self.registry.admit(handle.clone(), self.config.max_sessions).await {
            self.reject(&request, error.response_status()).await;
            return Err(error);
        }
        session.spawn();
        info!(
            "Received {} invitation {} from {}",
            handle.info().kind.name(),
            request.call_id,
            handle.info().remote
        );
        Ok(handle)
    }

    /// Accept an incoming chat invitation
    ///
    /// The first message and, for group chats, the participants are read
    /// from the invitation before it is accepted. An invitation whose
    /// content cannot be read is answered with an error status.
    pub async fn receive_chat_invitation(&self, request: InviteRequest) -> Result<SessionHandle> {
        self.reject_when_full(&request).await?;

        let first_message = match invitation::extract_first_message(&request, datetime::now_millis()) {
            Ok(message) => message,
            Err(error) => {
                warn!("Invalid chat invitation {}: {}", request.call_id, error);
                self.reject(&request, error.response_status()).await;
                return Err(error);
            }
        };

        let group = invitation::is_group_invitation(&request);
        let participants = if group {
            let local = self.config.local_contact();
            match invitation::extract_participants(&request, ParticipantStatus::Connected, local.as_ref()) {
                Ok(participants) => participants,
                Err(error) => {
                    warn!("Invalid participant list in {}: {}", request.call_id, error);
                    self.reject(&request, error.response_status()).await;
                    return Err(error);
                }
            }
        } else {
            HashMap::new()
        };

        let kind = SessionKind::Chat {
            group,
            participants,
            first_message,
            contribution_id: invitation::contribution_id(&request).map(str::to_string),
        };
        self.receive_invitation(request, kind).await
    }

    /// Accept an incoming IP call invitation
    pub async fn receive_ip_call_invitation(&self, request: InviteRequest) -> Result<SessionHandle> {
        let video = request
            .feature_tags()
            .iter()
            .any(|tag| tag.eq_ignore_ascii_case(rcs_message_core::feature_tags::FEATURE_RCSE_IP_VIDEO_CALL));
        self.receive_invitation(request, SessionKind::IpCall { video }).await
    }

    pub async fn get_session(&self, session_id: &SessionId) -> Result<SessionHandle> {
        self.registry
            .get(session_id)
            .await
            .ok_or_else(|| SessionError::session_not_found(session_id.to_string()))
    }

    pub async fn sessions(&self) -> Vec<SessionHandle> {
        self.registry.list().await
    }

    /// Whether an active session with `contact` exists
    pub async fn is_connected_with(&self, contact: &ContactId) -> bool {
        self.registry
            .find_by_contact(contact)
            .await
            .iter()
            .any(|handle| handle.state() == SessionState::Active)
    }

    /// End one session
    pub async fn abort_session(&self, session_id: &SessionId, reason: TerminationReason) -> Result<()> {
        let handle = self.get_session(session_id).await?;
        handle.abort(reason).await;
        Ok(())
    }

    /// End every live session, for example when the service stops
    pub async fn abort_all_sessions(&self) {
        let sessions = self.registry.list().await;
        if sessions.is_empty() {
            return;
        }
        info!("Aborting {} sessions", sessions.len());
        for handle in sessions {
            handle.abort(TerminationReason::BySystem).await;
        }
    }
}
