//! Shared fixtures: a recording signaling channel, an in-memory MSRP
//! connector and a listener that forwards every callback to a channel.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use rcs_message_core::{ChatMessage, ImdnReport};
use rcs_msrp_core::{
    ConnectRequest, MsrpConnector, MsrpEvent, MsrpPath, MsrpSession, MsrpSessionConfig, MsrpStream, SetupRole,
};
use rcs_session_core::sdp::{build_msrp_sdp, MsrpMediaInfo, MsrpSdpParams};
use rcs_session_core::{
    OutgoingInvite, RcsConfig, Result, SessionError, SessionId, SessionListener, SessionService, SignalingChannel,
    TerminationReason,
};

pub const REMOTE_NUMBER: &str = "+33600000001";
pub const LOCAL_IDENTITY: &str = "tel:+33600000099";
pub const PEER_IP: &str = "192.0.2.10";
pub const PEER_PORT: u16 = 7394;

/// What the session layer asked the signaling layer to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingCall {
    Invite(OutgoingInvite),
    Response {
        call_id: String,
        status: u16,
        sdp: Option<String>,
    },
    Bye {
        call_id: String,
    },
}

pub struct RecordingSignaling {
    calls: mpsc::UnboundedSender<SignalingCall>,
}

#[async_trait]
impl SignalingChannel for RecordingSignaling {
    async fn send_invite(&self, invite: OutgoingInvite) -> Result<()> {
        let _ = self.calls.send(SignalingCall::Invite(invite));
        Ok(())
    }

    async fn send_response(&self, call_id: &str, status: u16, sdp: Option<String>) -> Result<()> {
        let _ = self.calls.send(SignalingCall::Response {
            call_id: call_id.to_string(),
            status,
            sdp,
        });
        Ok(())
    }

    async fn send_bye(&self, call_id: &str) -> Result<()> {
        let _ = self.calls.send(SignalingCall::Bye {
            call_id: call_id.to_string(),
        });
        Ok(())
    }
}

/// Connector handing the far end of an in-memory pipe to the test
pub struct DuplexConnector {
    peers: mpsc::UnboundedSender<(ConnectRequest, DuplexStream)>,
}

#[async_trait]
impl MsrpConnector for DuplexConnector {
    async fn connect(&self, request: ConnectRequest) -> rcs_msrp_core::Result<Box<dyn MsrpStream>> {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        self.peers
            .send((request, remote))
            .map_err(|_| rcs_msrp_core::MsrpError::Closed)?;
        Ok(Box::new(local))
    }
}

/// Connector that never reaches the peer
pub struct FailingConnector;

#[async_trait]
impl MsrpConnector for FailingConnector {
    async fn connect(&self, request: ConnectRequest) -> rcs_msrp_core::Result<Box<dyn MsrpStream>> {
        Err(rcs_msrp_core::MsrpError::connect(
            format!("{}:{}", request.remote_host, request.remote_port),
            "connection refused",
        ))
    }
}

#[derive(Debug, Clone)]
pub enum ListenerEvent {
    Started(SessionId),
    Data { message_id: String, len: usize },
    Message(ChatMessage),
    Report(ImdnReport),
    Transferred(String),
    Error(String),
    Terminated(SessionId, TerminationReason),
}

pub struct ChannelListener {
    events: mpsc::UnboundedSender<ListenerEvent>,
}

impl SessionListener for ChannelListener {
    fn on_session_started(&self, session_id: &SessionId) {
        let _ = self.events.send(ListenerEvent::Started(session_id.clone()));
    }

    fn on_data_received(&self, _session_id: &SessionId, message_id: &str, data: &[u8], _content_type: Option<&str>) {
        let _ = self.events.send(ListenerEvent::Data {
            message_id: message_id.to_string(),
            len: data.len(),
        });
    }

    fn on_message_received(&self, _session_id: &SessionId, message: &ChatMessage) {
        let _ = self.events.send(ListenerEvent::Message(message.clone()));
    }

    fn on_delivery_report(&self, _session_id: &SessionId, report: &ImdnReport) {
        let _ = self.events.send(ListenerEvent::Report(report.clone()));
    }

    fn on_data_transferred(&self, _session_id: &SessionId, message_id: &str) {
        let _ = self.events.send(ListenerEvent::Transferred(message_id.to_string()));
    }

    fn on_session_error(&self, _session_id: &SessionId, error: &SessionError) {
        let _ = self.events.send(ListenerEvent::Error(error.to_string()));
    }

    fn on_session_terminated(&self, session_id: &SessionId, reason: TerminationReason) {
        let _ = self.events.send(ListenerEvent::Terminated(session_id.clone(), reason));
    }
}

pub struct Harness {
    pub service: SessionService,
    pub signaling: mpsc::UnboundedReceiver<SignalingCall>,
    pub peers: mpsc::UnboundedReceiver<(ConnectRequest, DuplexStream)>,
    pub events: mpsc::UnboundedReceiver<ListenerEvent>,
}

pub fn test_config() -> RcsConfig {
    RcsConfig::default()
        .with_local_address("127.0.0.1", 20000)
        .with_local_identity(LOCAL_IDENTITY)
}

pub fn harness(config: RcsConfig) -> Harness {
    let (peers_tx, peers) = mpsc::unbounded_channel();
    build_harness(config, Arc::new(DuplexConnector { peers: peers_tx }), peers)
}

/// A harness whose media connections always fail
pub fn failing_harness(config: RcsConfig) -> Harness {
    let (_, peers) = mpsc::unbounded_channel();
    build_harness(config, Arc::new(FailingConnector), peers)
}

fn build_harness(
    config: RcsConfig,
    connector: Arc<dyn MsrpConnector>,
    peers: mpsc::UnboundedReceiver<(ConnectRequest, DuplexStream)>,
) -> Harness {
    let (calls_tx, signaling) = mpsc::unbounded_channel();
    let (events_tx, events) = mpsc::unbounded_channel();

    let service = SessionService::new(config, Arc::new(RecordingSignaling { calls: calls_tx }), connector)
        .expect("valid configuration");
    service.add_listener(Arc::new(ChannelListener { events: events_tx }));

    Harness {
        service,
        signaling,
        peers,
        events,
    }
}

pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

pub fn peer_path() -> MsrpPath {
    MsrpPath::new(PEER_IP, PEER_PORT, "peer0001")
}

/// SDP of the remote endpoint
pub fn peer_sdp(setup: SetupRole) -> String {
    build_msrp_sdp(
        &MsrpSdpParams {
            local_ip: PEER_IP.to_string(),
            port: PEER_PORT,
            path: peer_path(),
            setup,
            max_size: 10240,
            accept_types: vec!["message/cpim".to_string()],
            wrapped_types: vec!["text/plain".to_string()],
        },
        3_900_000_000,
    )
}

/// Open the remote MSRP endpoint on the stream our session connected to
pub fn open_peer(stream: DuplexStream, our_sdp: &str) -> (MsrpSession, mpsc::Receiver<MsrpEvent>) {
    let ours = MsrpMediaInfo::parse(our_sdp).expect("valid local SDP");
    MsrpSession::open(stream, MsrpSessionConfig::new(peer_path(), ours.remote_path))
}

pub fn remote_contact() -> rcs_message_core::ContactId {
    rcs_message_core::ContactId::from_number(REMOTE_NUMBER).expect("valid number")
}
