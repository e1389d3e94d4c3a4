//! End-to-end session flows over an in-memory MSRP connection

mod common;

use std::time::Duration;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::timeout;

use rcs_message_core::{
    build_cpim_envelope, mime, parse_cpim_delivery_report, parse_cpim_envelope, ImdnOptions, ImdnReport, ImdnStatus,
};
use rcs_msrp_core::{MsrpEvent, SetupRole};
use rcs_session_core::{InviteRequest, SessionError, SessionKind, SessionState, TerminationReason};

use common::*;

async fn next_media(rx: &mut mpsc::Receiver<MsrpEvent>) -> MsrpEvent {
    timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for media event")
        .expect("media channel closed")
}

/// Skip media events until a delivery report arrives
async fn next_report(rx: &mut mpsc::Receiver<MsrpEvent>) -> ImdnReport {
    loop {
        if let MsrpEvent::DataReceived { data, .. } = next_media(rx).await {
            if let Ok(Some(report)) = parse_cpim_delivery_report(&data) {
                return report;
            }
        }
    }
}

/// Skip listener events until the session reports its end
async fn next_termination(events: &mut mpsc::UnboundedReceiver<ListenerEvent>) -> TerminationReason {
    loop {
        if let ListenerEvent::Terminated(_, reason) = next(events).await {
            return reason;
        }
    }
}

fn chat_invitation(call_id: &str) -> InviteRequest {
    InviteRequest::new(call_id, format!("<tel:{}>", REMOTE_NUMBER))
        .with_body("application/sdp", peer_sdp(SetupRole::Active))
        .with_referred_by(format!("<tel:{}>", REMOTE_NUMBER))
}

#[tokio::test]
async fn test_incoming_chat_session() {
    let mut h = harness(test_config());
    let handle = h
        .service
        .receive_chat_invitation(chat_invitation("call-7").with_subject("Hello"))
        .await
        .unwrap();
    assert_eq!(handle.info().remote, remote_contact());

    let answer = match next(&mut h.signaling).await {
        SignalingCall::Response { call_id, status, sdp } => {
            assert_eq!(call_id, "call-7");
            assert_eq!(status, 200);
            sdp.expect("SDP answer")
        }
        other => panic!("expected a response, got {:?}", other),
    };
    assert!(answer.contains("a=setup:passive"));
    assert!(answer.contains("a=accept-types:message/cpim application/im-iscomposing+xml"));

    match next(&mut h.events).await {
        ListenerEvent::Message(message) => assert_eq!(message.content(), "Hello"),
        other => panic!("expected the first message, got {:?}", other),
    }

    let (request, stream) = next(&mut h.peers).await;
    assert_eq!(request.setup, SetupRole::Passive);
    assert_eq!(request.remote_host, PEER_IP);
    assert_eq!(request.remote_port, PEER_PORT);
    let (peer, mut peer_events) = open_peer(stream, &answer);

    assert!(matches!(next(&mut h.events).await, ListenerEvent::Started(id) if &id == handle.id()));
    assert!(handle.is_active());

    // keep-alives never reach listeners
    peer.send_empty_chunk().unwrap();
    let cpim = build_cpim_envelope(
        &format!("tel:{}", REMOTE_NUMBER),
        LOCAL_IDENTITY,
        "How are you?",
        mime::TEXT_PLAIN,
        1_700_000_000_000,
        &ImdnOptions::DeliveryAndDisplay {
            message_id: "m-2".to_string(),
        },
    );
    peer.send(Bytes::from(cpim), mime::CPIM).unwrap();

    match next(&mut h.events).await {
        ListenerEvent::Data { len, .. } => assert!(len > 0),
        other => panic!("expected data, got {:?}", other),
    }
    match next(&mut h.events).await {
        ListenerEvent::Message(message) => {
            assert_eq!(message.message_id(), "m-2");
            assert_eq!(message.content(), "How are you?");
            assert_eq!(message.timestamp_sent(), 1_700_000_000_000);
        }
        other => panic!("expected a message, got {:?}", other),
    }

    let report = next_report(&mut peer_events).await;
    assert_eq!(report.message_id, "m-2");
    assert_eq!(report.status, ImdnStatus::Delivered);

    handle.on_remote_bye();
    assert_eq!(handle.wait_for_termination().await, TerminationReason::ByRemote);
    assert_eq!(next_termination(&mut h.events).await, TerminationReason::ByRemote);

    // the remote ended the dialog, no BYE goes out
    assert!(h.signaling.try_recv().is_err());
    assert!(h.service.registry().is_empty().await);
}

#[tokio::test]
async fn test_outgoing_chat_session() {
    let mut h = harness(test_config());
    let first = rcs_message_core::ChatMessage::text(remote_contact(), "Hi", 1_700_000_000_000, 1_700_000_000_000);
    let handle = h
        .service
        .initiate_chat_session(remote_contact(), Some(first))
        .await
        .unwrap();

    let invite = match next(&mut h.signaling).await {
        SignalingCall::Invite(invite) => invite,
        other => panic!("expected an INVITE, got {:?}", other),
    };
    assert_eq!(invite.call_id, handle.info().call_id);
    assert_eq!(invite.remote_uri, format!("tel:{}", REMOTE_NUMBER));
    assert_eq!(invite.accept_contact, vec!["+g.oma.sip-im".to_string()]);
    assert!(invite.contribution_id.is_some());
    assert!(invite.sdp.contains("m=message 9 TCP/MSRP *"));
    assert!(invite.sdp.contains("a=setup:active"));
    let first_message = parse_cpim_envelope(invite.first_message.expect("first message").as_bytes()).unwrap();
    assert_eq!(first_message.content(), "Hi");
    assert_eq!(handle.state(), SessionState::Offering);

    handle.on_answer(peer_sdp(SetupRole::Passive));
    let (request, stream) = next(&mut h.peers).await;
    assert_eq!(request.setup, SetupRole::Active);
    let (_peer, mut peer_events) = open_peer(stream, &invite.sdp);
    assert!(matches!(next(&mut h.events).await, ListenerEvent::Started(_)));

    let message_id = handle.send_message("ping", mime::TEXT_PLAIN).await.unwrap();
    let received = loop {
        if let MsrpEvent::DataReceived { data, content_type, .. } = next_media(&mut peer_events).await {
            assert_eq!(content_type.as_deref(), Some(mime::CPIM));
            break parse_cpim_envelope(&data).unwrap();
        }
    };
    assert_eq!(received.message_id(), Some(message_id.as_str()));
    assert_eq!(received.content(), "ping");
    assert!(received.is_display_requested());
    assert!(matches!(next(&mut h.events).await, ListenerEvent::Transferred(_)));

    handle.abort(TerminationReason::ByUser).await;
    assert_eq!(handle.state(), SessionState::Terminated(TerminationReason::ByUser));
    assert_eq!(
        next(&mut h.signaling).await,
        SignalingCall::Bye {
            call_id: invite.call_id.clone()
        }
    );
    assert_eq!(next_termination(&mut h.events).await, TerminationReason::ByUser);

    // aborting again changes nothing
    handle.abort(TerminationReason::BySystem).await;
    assert_eq!(handle.state(), SessionState::Terminated(TerminationReason::ByUser));
    assert!(h.signaling.try_recv().is_err());
    assert!(matches!(
        handle.send_message("late", mime::TEXT_PLAIN).await,
        Err(SessionError::InvalidState { .. })
    ));
    assert!(h.service.registry().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_is_terminated_once() {
    let config = test_config().with_idle_threshold_ms(30_000, 1_000);
    let mut h = harness(config);
    let handle = h.service.receive_chat_invitation(chat_invitation("call-idle")).await.unwrap();

    let answer = match next(&mut h.signaling).await {
        SignalingCall::Response { status: 200, sdp, .. } => sdp.expect("SDP answer"),
        other => panic!("expected 200 OK, got {:?}", other),
    };
    let (_, stream) = next(&mut h.peers).await;
    let (_peer, _peer_events) = open_peer(stream, &answer);
    assert!(matches!(next(&mut h.events).await, ListenerEvent::Started(_)));

    assert_eq!(handle.wait_for_termination().await, TerminationReason::ByInactivity);
    assert_eq!(
        next(&mut h.signaling).await,
        SignalingCall::Bye {
            call_id: "call-idle".to_string()
        }
    );
    assert_eq!(next_termination(&mut h.events).await, TerminationReason::ByInactivity);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(h.events.try_recv().is_err());
    assert!(h.service.registry().is_empty().await);
}

#[tokio::test]
async fn test_peer_dropping_connection_ends_session() {
    let mut h = harness(test_config().with_max_sessions(1));
    let handle = h.service.receive_chat_invitation(chat_invitation("call-drop")).await.unwrap();

    let answer = match next(&mut h.signaling).await {
        SignalingCall::Response { status: 200, sdp, .. } => sdp.expect("SDP answer"),
        other => panic!("expected 200 OK, got {:?}", other),
    };
    let (_, stream) = next(&mut h.peers).await;
    let (peer, peer_events) = open_peer(stream, &answer);
    assert!(matches!(next(&mut h.events).await, ListenerEvent::Started(_)));

    peer.close();
    drop(peer);
    drop(peer_events);

    assert_eq!(handle.wait_for_termination().await, TerminationReason::MediaFailed);
    assert!(matches!(next(&mut h.events).await, ListenerEvent::Error(_)));
    assert_eq!(next_termination(&mut h.events).await, TerminationReason::MediaFailed);
    assert_eq!(
        next(&mut h.signaling).await,
        SignalingCall::Bye {
            call_id: "call-drop".to_string()
        }
    );

    // the slot is free again
    assert!(h.service.registry().is_empty().await);
    h.service.receive_chat_invitation(chat_invitation("call-next")).await.unwrap();
}

#[tokio::test]
async fn test_invitation_rejected_when_full() {
    let mut h = harness(test_config().with_max_sessions(1));
    let first = h
        .service
        .initiate_session(remote_contact(), SessionKind::one_to_one_chat())
        .await
        .unwrap();
    assert!(matches!(next(&mut h.signaling).await, SignalingCall::Invite(_)));

    let result = h.service.receive_chat_invitation(chat_invitation("call-busy")).await;
    assert!(matches!(result, Err(SessionError::CapacityExceeded { max: 1 })));
    assert_eq!(
        next(&mut h.signaling).await,
        SignalingCall::Response {
            call_id: "call-busy".to_string(),
            status: 486,
            sdp: None
        }
    );

    let result = h.service.initiate_session(remote_contact(), SessionKind::one_to_one_chat()).await;
    assert!(matches!(result, Err(SessionError::CapacityExceeded { .. })));

    assert_eq!(h.service.registry().len().await, 1);
    let stats = h.service.registry().get_stats().await;
    assert_eq!(stats.total_admitted, 1);
    assert_eq!(stats.total_rejected, 2);
    assert_eq!(h.service.get_session(first.id()).await.unwrap().id(), first.id());
}

#[tokio::test]
async fn test_invitation_without_sender_is_rejected() {
    let mut h = harness(test_config());
    let request = InviteRequest::new("call-anon", "<sip:anonymous@anonymous.invalid>")
        .with_body("application/sdp", peer_sdp(SetupRole::Active))
        .with_subject("Hello");

    let result = h.service.receive_chat_invitation(request).await;
    assert!(matches!(result, Err(SessionError::MissingSenderIdentity { .. })));
    assert!(matches!(
        next(&mut h.signaling).await,
        SignalingCall::Response { status: 400, .. }
    ));
    assert!(h.service.registry().is_empty().await);
}

#[tokio::test]
async fn test_unreadable_cpim_part_does_not_reject_invitation() {
    let mut h = harness(test_config());
    let boundary = "next-part";
    let body = format!(
        "--{b}\r\nContent-Type: application/sdp\r\n\r\n{sdp}\r\n\
         --{b}\r\nContent-Type: message/cpim\r\n\r\nFrom: <tel:{n}>\r\n\
         --{b}--\r\n",
        b = boundary,
        sdp = peer_sdp(SetupRole::Active),
        n = REMOTE_NUMBER
    );
    let request = InviteRequest::new("call-cpim", format!("<tel:{}>", REMOTE_NUMBER))
        .with_body(format!("multipart/mixed; boundary={}", boundary), body)
        .with_referred_by(format!("<tel:{}>", REMOTE_NUMBER))
        .with_subject("Hello");

    let _handle = h.service.receive_chat_invitation(request).await.unwrap();
    assert!(matches!(
        next(&mut h.signaling).await,
        SignalingCall::Response { status: 200, .. }
    ));
    match next(&mut h.events).await {
        ListenerEvent::Message(message) => assert_eq!(message.content(), "Hello"),
        other => panic!("expected the subject as first message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_signaling_failures_map_to_termination_reasons() {
    let mut h = harness(test_config());
    for (code, expected) in [
        (408, TerminationReason::ByTimeout),
        (603, TerminationReason::ByRemote),
        (486, TerminationReason::ByRemote),
        (500, TerminationReason::BySystem),
    ] {
        let handle = h
            .service
            .initiate_session(remote_contact(), SessionKind::one_to_one_chat())
            .await
            .unwrap();
        assert!(matches!(next(&mut h.signaling).await, SignalingCall::Invite(_)));

        handle.on_signaling_failure(code, "failed");
        assert_eq!(handle.wait_for_termination().await, expected);
        assert!(matches!(next(&mut h.events).await, ListenerEvent::Error(_)));
        assert_eq!(next_termination(&mut h.events).await, expected);
    }
    // no dialog was ever established
    assert!(h.signaling.try_recv().is_err());
    assert!(h.service.registry().is_empty().await);
}

#[tokio::test]
async fn test_media_failure_ends_session() {
    let mut h = failing_harness(test_config());
    let handle = h.service.receive_chat_invitation(chat_invitation("call-fail")).await.unwrap();

    assert!(matches!(
        next(&mut h.signaling).await,
        SignalingCall::Response { status: 200, .. }
    ));
    assert_eq!(handle.wait_for_termination().await, TerminationReason::MediaFailed);
    assert!(matches!(next(&mut h.events).await, ListenerEvent::Error(_)));
    assert_eq!(next_termination(&mut h.events).await, TerminationReason::MediaFailed);
    assert_eq!(
        next(&mut h.signaling).await,
        SignalingCall::Bye {
            call_id: "call-fail".to_string()
        }
    );
}

#[tokio::test]
async fn test_ip_call_is_signaling_only() {
    let mut h = harness(test_config());
    let request = InviteRequest::new("call-voice", format!("<tel:{}>", REMOTE_NUMBER));
    let handle = h.service.receive_ip_call_invitation(request).await.unwrap();
    assert_eq!(handle.info().kind, SessionKind::IpCall { video: false });

    assert_eq!(
        next(&mut h.signaling).await,
        SignalingCall::Response {
            call_id: "call-voice".to_string(),
            status: 200,
            sdp: None
        }
    );
    assert!(matches!(next(&mut h.events).await, ListenerEvent::Started(_)));
    assert!(h.service.is_connected_with(&remote_contact()).await);
    assert!(h.peers.try_recv().is_err());
}

#[tokio::test]
async fn test_abort_all_sessions() {
    let mut h = harness(test_config());
    let mut handles = Vec::new();
    for _ in 0..2 {
        handles.push(
            h.service
                .initiate_session(remote_contact(), SessionKind::one_to_one_chat())
                .await
                .unwrap(),
        );
    }
    assert_eq!(h.service.sessions().await.len(), 2);

    h.service.abort_all_sessions().await;
    for handle in &handles {
        assert_eq!(handle.state(), SessionState::Terminated(TerminationReason::BySystem));
    }
    assert_eq!(next_termination(&mut h.events).await, TerminationReason::BySystem);
    assert_eq!(next_termination(&mut h.events).await, TerminationReason::BySystem);
    assert!(h.service.registry().is_empty().await);

    let missing = h.service.abort_session(handles[0].id(), TerminationReason::ByUser).await;
    assert!(matches!(missing, Err(SessionError::SessionNotFound { .. })));
}
