//! Session task and its handle
//!
//! Each session runs as one tokio task that owns all of its state. The
//! [`SessionHandle`] and every collaborator (signaling events, the MSRP
//! transport, the activity monitor) talk to it by posting
//! [`SessionCommand`]s, so nothing inside a session is locked.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use rcs_message_core::{
    build_cpim_delivery_report, build_cpim_envelope, build_imdn_report, build_resource_list, datetime,
    feature_tags, generate_message_id, geoloc, mime, parse_cpim_envelope, parse_imdn_report, ChatMessage,
    ContactId, ImdnOptions, ImdnStatus,
};
use rcs_msrp_core::{
    ConnectRequest, MsrpConnector, MsrpEvent, MsrpPath, MsrpSession, MsrpSessionConfig, SetupRole,
};

use crate::config::RcsConfig;
use crate::errors::{Result, SessionError};
use crate::invitation::chat_message_from_cpim;
use crate::listener::SessionListener;
use crate::registry::WeakSessionRegistry;
use crate::request::status;
use crate::sdp::{build_msrp_sdp, ntp_time, MsrpMediaInfo, MsrpSdpParams};
use crate::signaling::{OutgoingInvite, SignalingChannel};
use crate::types::{SessionId, SessionInfo, SessionKind, SessionRole, SessionState, TerminationReason};

/// Identity used in CPIM headers when ours is not configured
const ANONYMOUS_URI: &str = "sip:anonymous@anonymous.invalid";

/// Events and requests processed by a session task
pub(crate) enum SessionCommand {
    /// SDP answer of our INVITE
    Answer { sdp: String },
    /// Our INVITE failed or the dialog broke
    SignalingFailed { status: u16, reason: String },
    RemoteBye,
    SendMessage {
        content: String,
        content_type: String,
        reply: oneshot::Sender<Result<String>>,
    },
    /// The MSRP connection is up, or could not be opened
    MediaOpened(Result<(MsrpSession, mpsc::Receiver<MsrpEvent>)>),
    Media(MsrpEvent),
    Inactivity,
    Abort(TerminationReason),
}

/// Cheap, cloneable handle on a running session
#[derive(Clone)]
pub struct SessionHandle {
    info: Arc<SessionInfo>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.info.id)
            .field("kind", &self.info.kind.name())
            .field("state", &self.state())
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> &SessionId {
        &self.info.id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    fn post(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Deliver the SDP answer to our INVITE
    pub fn on_answer(&self, sdp: impl Into<String>) {
        if !self.post(SessionCommand::Answer { sdp: sdp.into() }) {
            debug!("Answer for ended session {} ignored", self.id());
        }
    }

    /// Deliver a final failure response or a transaction timeout
    pub fn on_signaling_failure(&self, status: u16, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.post(SessionCommand::SignalingFailed { status, reason }) {
            debug!("Signaling failure for ended session {} ignored", self.id());
        }
    }

    /// The remote party sent BYE
    pub fn on_remote_bye(&self) {
        if !self.post(SessionCommand::RemoteBye) {
            debug!("BYE for ended session {} ignored", self.id());
        }
    }

    /// Send a message and return its id
    ///
    /// Chat sessions wrap the content in CPIM; `content_type` is then an
    /// API type (`text/plain` or `application/geoloc`). Other sessions send
    /// the content as is.
    pub async fn send_message(&self, content: impl Into<String>, content_type: &str) -> Result<String> {
        let (reply, response) = oneshot::channel();
        let command = SessionCommand::SendMessage {
            content: content.into(),
            content_type: content_type.to_string(),
            reply,
        };
        if !self.post(command) {
            return Err(SessionError::invalid_state(format!("session {} has ended", self.id())));
        }
        response
            .await
            .map_err(|_| SessionError::invalid_state(format!("session {} has ended", self.id())))?
    }

    /// End the session and wait until it is terminated
    ///
    /// Aborting an ended session does nothing.
    pub async fn abort(&self, reason: TerminationReason) {
        if self.state().is_terminated() {
            return;
        }
        if self.post(SessionCommand::Abort(reason)) {
            debug!("Abort of session {} requested ({})", self.id(), reason);
        }
        self.wait_for_termination().await;
    }

    /// Wait for the session to end and return why it ended
    pub async fn wait_for_termination(&self) -> TerminationReason {
        let mut state = self.state.clone();
        loop {
            if let SessionState::Terminated(reason) = *state.borrow_and_update() {
                return reason;
            }
            if state.changed().await.is_err() {
                // the task is gone without publishing its end
                return match *state.borrow() {
                    SessionState::Terminated(reason) => reason,
                    _ => TerminationReason::BySystem,
                };
            }
        }
    }

    /// A handle with no task behind it
    #[cfg(test)]
    pub(crate) fn detached(remote: ContactId) -> Self {
        let (commands, _) = mpsc::unbounded_channel();
        let (_, state) = watch::channel(SessionState::Idle);
        Self {
            info: Arc::new(SessionInfo {
                id: SessionId::new(),
                role: SessionRole::Originating,
                kind: SessionKind::one_to_one_chat(),
                remote,
                call_id: "detached".to_string(),
                created_at: chrono::Utc::now(),
            }),
            commands,
            state,
        }
    }
}

/// Collaborators handed to every session
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub config: Arc<RcsConfig>,
    pub signaling: Arc<dyn SignalingChannel>,
    pub connector: Arc<dyn MsrpConnector>,
    pub listeners: Arc<Vec<Arc<dyn SessionListener>>>,
    pub registry: WeakSessionRegistry,
}

/// State owned by a session task
pub(crate) struct Session {
    info: Arc<SessionInfo>,
    ctx: SessionContext,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    commands_tx: mpsc::UnboundedSender<SessionCommand>,
    commands_rx: mpsc::UnboundedReceiver<SessionCommand>,
    local_path: MsrpPath,
    local_setup: SetupRole,
    /// Offer of an incoming invitation
    remote_offer: Option<String>,
    msrp: Option<MsrpSession>,
    media_forwarder: Option<JoinHandle<()>>,
    dialog_established: bool,
}

impl Session {
    /// Build a session and its handle; nothing runs until [`Session::spawn`]
    pub(crate) fn new(info: SessionInfo, ctx: SessionContext, remote_offer: Option<String>) -> (SessionHandle, Session) {
        let info = Arc::new(info);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let local_path = MsrpPath::generate(
            ctx.config.local_ip_address.clone(),
            ctx.config.local_msrp_port,
            ctx.config.msrp_tls,
        );
        let local_setup = match info.role {
            SessionRole::Originating => SetupRole::Active,
            SessionRole::Terminating => SetupRole::Passive,
        };

        let handle = SessionHandle {
            info: info.clone(),
            commands: commands_tx.clone(),
            state: state_rx,
        };
        let session = Session {
            info,
            ctx,
            state: SessionState::Idle,
            state_tx,
            commands_tx,
            commands_rx,
            local_path,
            local_setup,
            remote_offer,
            msrp: None,
            media_forwarder: None,
            dialog_established: false,
        };
        (handle, session)
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        debug!(
            "Session {} started: {} {:?} with {}",
            self.info.id,
            self.info.kind.name(),
            self.info.role,
            self.info.remote
        );
        self.start().await;

        while !self.state.is_terminated() {
            let Some(command) = self.commands_rx.recv().await else {
                break;
            };
            self.handle_command(command).await;
        }
        trace!("Session {} task finished", self.info.id);
    }

    fn id(&self) -> &SessionId {
        &self.info.id
    }

    fn set_state(&mut self, next: SessionState) {
        debug!("Session {} state {} -> {}", self.info.id, self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(SessionError::invalid_state(format!(
                "cannot move session {} from {} to {}",
                self.info.id, self.state, next
            )));
        }
        self.set_state(next);
        Ok(())
    }

    fn listeners(&self) -> Arc<Vec<Arc<dyn SessionListener>>> {
        self.ctx.listeners.clone()
    }

    fn local_uri(&self) -> String {
        self.ctx
            .config
            .local_identity
            .clone()
            .unwrap_or_else(|| ANONYMOUS_URI.to_string())
    }

    async fn start(&mut self) {
        let result = match self.info.role {
            SessionRole::Originating => self.send_offer().await,
            SessionRole::Terminating => self.answer_offer().await,
        };
        if let Err(error) = result {
            if self.info.role == SessionRole::Terminating && !self.dialog_established {
                let code = error.response_status();
                if let Err(e) = self.ctx.signaling.send_response(&self.info.call_id, code, None).await {
                    warn!("Failed to reject invitation {}: {}", self.info.call_id, e);
                }
            }
            self.fail(error).await;
        }
    }

    fn local_sdp(&self) -> String {
        let config = &self.ctx.config;
        let params = MsrpSdpParams {
            local_ip: config.local_ip_address.clone(),
            port: config.local_msrp_port,
            path: self.local_path.clone(),
            setup: self.local_setup,
            max_size: config.max_chunk_size,
            accept_types: self.info.kind.accept_types(),
            wrapped_types: self.info.kind.wrapped_types(&config.capabilities),
        };
        build_msrp_sdp(&params, ntp_time())
    }

    async fn send_offer(&mut self) -> Result<()> {
        self.transition(SessionState::Offering)?;
        let capabilities = &self.ctx.config.capabilities;

        let mut invite = OutgoingInvite {
            call_id: self.info.call_id.clone(),
            remote_uri: self.info.remote.to_uri(),
            feature_tags: self.info.kind.feature_tags(capabilities),
            accept_contact: self.info.kind.feature_tags(capabilities),
            sdp: self.local_sdp(),
            ..Default::default()
        };

        if let SessionKind::Chat {
            group,
            participants,
            first_message,
            contribution_id,
        } = &self.info.kind
        {
            invite.accept_contact = feature_tags::accept_contact_tags();
            invite.contribution_id = Some(contribution_id.clone().unwrap_or_else(generate_message_id));
            if let Some(message) = first_message {
                invite.first_message = Some(self.wrap_chat_message(message)?);
            }
            if *group {
                invite.resource_list = Some(build_resource_list(participants.keys())?);
            }
        }

        info!("Sending {} invitation {} to {}", self.info.kind.name(), self.info.call_id, self.info.remote);
        self.ctx.signaling.send_invite(invite).await
    }

    async fn answer_offer(&mut self) -> Result<()> {
        self.transition(SessionState::Answering)?;

        if !self.info.kind.uses_msrp() {
            self.ctx
                .signaling
                .send_response(&self.info.call_id, status::OK, None)
                .await?;
            self.dialog_established = true;
            self.activate()?;
            return Ok(());
        }

        let offer = self
            .remote_offer
            .take()
            .ok_or_else(|| SessionError::signaling("invitation without SDP offer"))?;
        let media = MsrpMediaInfo::parse(&offer)?;
        self.local_setup = SetupRole::answer_to(media.setup);

        let answer = self.local_sdp();
        self.ctx
            .signaling
            .send_response(&self.info.call_id, status::OK, Some(answer))
            .await?;
        self.dialog_established = true;
        info!("Accepted {} invitation {}", self.info.kind.name(), self.info.call_id);

        if let SessionKind::Chat {
            first_message: Some(message),
            ..
        } = &self.info.kind
        {
            for listener in self.listeners().iter() {
                listener.on_message_received(&self.info.id, message);
            }
        }

        self.open_media(media)
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Answer { sdp } => self.on_answer(sdp).await,
            SessionCommand::SignalingFailed { status, reason } => self.on_signaling_failure(status, reason).await,
            SessionCommand::RemoteBye => {
                info!("Session {} ended by remote", self.info.id);
                self.terminate(TerminationReason::ByRemote).await;
            }
            SessionCommand::SendMessage {
                content,
                content_type,
                reply,
            } => {
                let result = self.send_message(&content, &content_type);
                if let Err(e) = &result {
                    debug!("Send on session {} failed: {}", self.info.id, e);
                }
                let _ = reply.send(result);
            }
            SessionCommand::MediaOpened(result) => self.on_media_opened(result).await,
            SessionCommand::Media(event) => self.on_media_event(event).await,
            SessionCommand::Inactivity => {
                if self.state == SessionState::Active {
                    info!("Session {} idle, terminating", self.info.id);
                    self.terminate(TerminationReason::ByInactivity).await;
                }
            }
            SessionCommand::Abort(reason) => self.terminate(reason).await,
        }
    }

    async fn on_answer(&mut self, sdp: String) {
        if self.state != SessionState::Offering {
            warn!("Unexpected answer for session {} in state {}", self.info.id, self.state);
            return;
        }
        self.dialog_established = true;

        let result = if self.info.kind.uses_msrp() {
            MsrpMediaInfo::parse(&sdp).and_then(|media| self.open_media(media))
        } else {
            self.activate()
        };
        if let Err(error) = result {
            self.fail(error).await;
        }
    }

    async fn on_signaling_failure(&mut self, code: u16, reason: String) {
        if self.state.is_ending() {
            return;
        }
        let termination = if code == status::REQUEST_TIMEOUT {
            TerminationReason::ByTimeout
        } else if status::is_decline(code) {
            TerminationReason::ByRemote
        } else {
            TerminationReason::BySystem
        };
        let error = SessionError::signaling(format!("{} {}", code, reason));
        warn!("Session {} signaling failed: {}", self.info.id, error);
        for listener in self.listeners().iter() {
            listener.on_session_error(&self.info.id, &error);
        }
        self.terminate(termination).await;
    }

    fn local_socket_addr(&self) -> Result<SocketAddr> {
        let config = &self.ctx.config;
        let ip = if self.local_setup.is_active() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            config
                .local_ip_address
                .parse::<IpAddr>()
                .map_err(|e| SessionError::config(format!("Invalid local IP address: {}", e)))?
        };
        Ok(SocketAddr::new(ip, config.local_msrp_port))
    }

    /// Open the MSRP connection off the session task
    fn open_media(&mut self, media: MsrpMediaInfo) -> Result<()> {
        self.transition(SessionState::EstablishingMedia)?;
        let config = &self.ctx.config;

        let request = ConnectRequest {
            setup: self.local_setup,
            local_addr: self.local_socket_addr()?,
            remote_host: media.remote_host.clone(),
            remote_port: media.remote_port,
        };
        let msrp_config = MsrpSessionConfig::new(self.local_path.clone(), media.remote_path.clone())
            .with_max_chunk_size(media.max_size.map_or(config.max_chunk_size, |max| max.min(config.max_chunk_size)))
            .with_max_incoming_chunk_size(config.max_chunk_size)
            .with_max_message_size(config.max_message_size)
            .with_idle_threshold(config.idle_threshold(), config.activity_check_interval());

        debug!(
            "Opening MSRP media for session {} ({} {}:{})",
            self.info.id, request.setup, request.remote_host, request.remote_port
        );
        let connector = self.ctx.connector.clone();
        let commands = self.commands_tx.clone();
        tokio::spawn(async move {
            let result = connector
                .connect(request)
                .await
                .map(|stream| MsrpSession::open(stream, msrp_config))
                .map_err(SessionError::from);
            let _ = commands.send(SessionCommand::MediaOpened(result));
        });
        Ok(())
    }

    async fn on_media_opened(&mut self, result: Result<(MsrpSession, mpsc::Receiver<MsrpEvent>)>) {
        let (msrp, mut events) = match result {
            Ok(opened) => opened,
            Err(error) => {
                if !self.state.is_ending() {
                    error!("Session {} failed to open media: {}", self.info.id, error);
                    self.fail(error).await;
                }
                return;
            }
        };
        if self.state != SessionState::EstablishingMedia {
            debug!("Media of session {} opened too late, closing", self.info.id);
            msrp.close();
            return;
        }

        let commands = self.commands_tx.clone();
        self.media_forwarder = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if commands.send(SessionCommand::Media(event)).is_err() {
                    break;
                }
            }
        }));

        let commands = self.commands_tx.clone();
        msrp.activity().start(move || {
            let _ = commands.send(SessionCommand::Inactivity);
        });
        self.msrp = Some(msrp);

        if let Err(error) = self.activate() {
            self.fail(error).await;
        }
    }

    fn activate(&mut self) -> Result<()> {
        self.transition(SessionState::Active)?;
        info!("Session {} active with {}", self.info.id, self.info.remote);
        for listener in self.listeners().iter() {
            listener.on_session_started(&self.info.id);
        }
        Ok(())
    }

    async fn on_media_event(&mut self, event: MsrpEvent) {
        match event {
            MsrpEvent::DataReceived {
                message_id,
                data,
                content_type,
            } => self.on_data_received(&message_id, &data, content_type.as_deref()),
            MsrpEvent::DataTransferred { message_id } => {
                trace!("Message {} delivered on session {}", message_id, self.info.id);
                for listener in self.listeners().iter() {
                    listener.on_data_transferred(&self.info.id, &message_id);
                }
            }
            MsrpEvent::TransferError {
                message_id,
                error,
                chunk_type,
            } => {
                if self.state.is_ending() {
                    debug!("Transfer error on ending session {} ignored: {}", self.info.id, error);
                    return;
                }
                let error = SessionError::transport(format!(
                    "{:?} transfer of {} failed: {}",
                    chunk_type,
                    message_id.as_deref().unwrap_or("unknown message"),
                    error
                ));
                self.fail(error).await;
            }
            MsrpEvent::ConnectionClosed => {
                if self.state != SessionState::Active {
                    debug!("MSRP connection of session {} closed while {}", self.info.id, self.state);
                    return;
                }
                info!("MSRP connection of session {} closed by peer", self.info.id);
                self.fail(SessionError::transport("MSRP connection closed by peer")).await;
            }
        }
    }

    fn on_data_received(&mut self, message_id: &str, data: &[u8], content_type: Option<&str>) {
        if let Some(msrp) = &self.msrp {
            msrp.activity().update();
        }
        if data.is_empty() {
            trace!("Keep-alive on session {}", self.info.id);
            return;
        }

        for listener in self.listeners().iter() {
            listener.on_data_received(&self.info.id, message_id, data, content_type);
        }
        if self.info.kind.decodes_cpim() {
            self.on_chat_payload(message_id, data, content_type);
        }
    }

    fn on_chat_payload(&mut self, msrp_message_id: &str, data: &[u8], content_type: Option<&str>) {
        match content_type {
            Some(t) if mime::is_cpim(t) => {}
            Some(t) if mime::is_composing(t) => {
                trace!("Is-composing on session {}", self.info.id);
                return;
            }
            other => {
                debug!("Unexpected chat payload type {:?} on session {}", other, self.info.id);
                return;
            }
        }

        let cpim_message = match parse_cpim_envelope(data) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping message {} on session {}: {}", msrp_message_id, self.info.id, e);
                return;
            }
        };

        let inner_type = cpim_message.content_type().unwrap_or(mime::TEXT_PLAIN);
        if mime::is_imdn(inner_type) {
            match parse_imdn_report(cpim_message.content()) {
                Ok(report) => {
                    debug!("Report {} for message {}", report.status, report.message_id);
                    for listener in self.listeners().iter() {
                        listener.on_delivery_report(&self.info.id, &report);
                    }
                }
                Err(e) => warn!("Dropping delivery report on session {}: {}", self.info.id, e),
            }
            return;
        }
        if mime::is_composing(inner_type) {
            return;
        }

        let message_id = cpim_message.message_id().unwrap_or(msrp_message_id).to_string();
        let remote = cpim_message
            .from()
            .and_then(ContactId::from_uri)
            .unwrap_or_else(|| self.info.remote.clone());
        let message = match chat_message_from_cpim(&cpim_message, &message_id, remote, datetime::now_millis()) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                warn!("Dropping message {} on session {}: {}", message_id, self.info.id, e);
                return;
            }
        };

        if cpim_message.is_delivery_requested() {
            self.send_delivery_report(&message_id);
        }
        for listener in self.listeners().iter() {
            listener.on_message_received(&self.info.id, &message);
        }
    }

    fn send_delivery_report(&self, message_id: &str) {
        let Some(msrp) = &self.msrp else {
            return;
        };
        let now = datetime::now_millis();
        let result = build_imdn_report(message_id, ImdnStatus::Delivered, now)
            .map_err(SessionError::from)
            .and_then(|imdn| {
                let report = build_cpim_delivery_report(&self.local_uri(), &self.info.remote.to_uri(), &imdn, now);
                msrp.send(Bytes::from(report), mime::CPIM).map_err(SessionError::from)
            });
        if let Err(e) = result {
            warn!("Failed to send delivery report for {}: {}", message_id, e);
        }
    }

    /// CPIM envelope of an outgoing chat message
    fn wrap_chat_message(&self, message: &ChatMessage) -> Result<String> {
        let network_type = message.kind().network_mime_type();
        let content = if mime::is_geoloc(network_type) {
            geoloc::persisted_geoloc_to_network(
                message.content(),
                &self.local_uri(),
                message.message_id(),
                message.timestamp_sent(),
            )?
        } else {
            message.content().to_string()
        };
        let imdn = if self.ctx.config.request_display_report {
            ImdnOptions::DeliveryAndDisplay {
                message_id: message.message_id().to_string(),
            }
        } else {
            ImdnOptions::DeliveryOnly {
                message_id: message.message_id().to_string(),
            }
        };
        Ok(build_cpim_envelope(
            &self.local_uri(),
            &self.info.remote.to_uri(),
            &content,
            network_type,
            message.timestamp_sent(),
            &imdn,
        ))
    }

    fn send_message(&mut self, content: &str, content_type: &str) -> Result<String> {
        if self.state != SessionState::Active {
            return Err(SessionError::invalid_state(format!(
                "session {} is {}, not active",
                self.info.id, self.state
            )));
        }
        let msrp = self
            .msrp
            .as_ref()
            .ok_or_else(|| SessionError::invalid_state("session has no message media"))?;

        if !self.info.kind.decodes_cpim() {
            return Ok(msrp.send(Bytes::copy_from_slice(content.as_bytes()), content_type)?);
        }

        let now = datetime::now_millis();
        let message = ChatMessage::from_api_mime_type(
            generate_message_id(),
            content_type,
            content,
            self.info.remote.clone(),
            None,
            now,
            now,
        )?;
        let cpim = self.wrap_chat_message(&message)?;
        msrp.send(Bytes::from(cpim), mime::CPIM)?;
        debug!("Queued message {} on session {}", message.message_id(), self.info.id);
        Ok(message.message_id().to_string())
    }

    /// Report `error` to listeners and end the session accordingly
    async fn fail(&mut self, error: SessionError) {
        if self.state.is_ending() {
            return;
        }
        warn!("Session {} failed: {}", self.info.id, error);
        for listener in self.listeners().iter() {
            listener.on_session_error(&self.info.id, &error);
        }
        self.terminate(error.termination_reason()).await;
    }

    async fn terminate(&mut self, reason: TerminationReason) {
        if self.state.is_ending() {
            return;
        }
        info!("Terminating session {} ({})", self.info.id, reason);
        self.set_state(SessionState::Terminating);

        if let Some(msrp) = self.msrp.take() {
            msrp.activity().stop();
            msrp.close();
        }
        if let Some(forwarder) = self.media_forwarder.take() {
            forwarder.abort();
        }

        if self.dialog_established && reason != TerminationReason::ByRemote {
            if let Err(e) = self.ctx.signaling.send_bye(&self.info.call_id).await {
                warn!("Failed to send BYE for session {}: {}", self.info.id, e);
            }
        }

        self.commands_rx.close();
        if let Some(registry) = self.ctx.registry.upgrade() {
            registry.unregister(self.id()).await;
        }

        self.set_state(SessionState::Terminated(reason));
        for listener in self.listeners().iter() {
            listener.on_session_terminated(&self.info.id, reason);
        }
    }
}
