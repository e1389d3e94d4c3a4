//! MSRP session behaviour over in-memory streams

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rcs_msrp_core::{ActivityMonitor, ChunkType, MsrpEvent, MsrpPath, MsrpSession, MsrpSessionConfig};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn session_pair(max_chunk_size: usize) -> ((MsrpSession, mpsc::Receiver<MsrpEvent>), (MsrpSession, mpsc::Receiver<MsrpEvent>)) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let alice = MsrpPath::new("127.0.0.1", 7777, "alice");
    let bob = MsrpPath::new("127.0.0.1", 8888, "bob");
    let alice_session = MsrpSession::open(
        a,
        MsrpSessionConfig::new(alice.clone(), bob.clone()).with_max_chunk_size(max_chunk_size),
    );
    let bob_session = MsrpSession::open(b, MsrpSessionConfig::new(bob, alice).with_max_chunk_size(max_chunk_size));
    (alice_session, bob_session)
}

async fn next_event(rx: &mut mpsc::Receiver<MsrpEvent>) -> MsrpEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for MSRP event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_small_message_is_delivered_and_acknowledged() {
    let ((alice, mut alice_events), (_bob, mut bob_events)) = session_pair(1024);

    let message_id = alice.send(Bytes::from_static(b"Hello Bob"), "message/cpim").unwrap();

    match next_event(&mut bob_events).await {
        MsrpEvent::DataReceived { message_id: received_id, data, content_type } => {
            assert_eq!(received_id, message_id);
            assert_eq!(&data[..], b"Hello Bob");
            assert_eq!(content_type.as_deref(), Some("message/cpim"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(next_event(&mut alice_events).await, MsrpEvent::DataTransferred { message_id });
}

#[tokio::test]
async fn test_large_message_is_chunked_and_reassembled() {
    let ((alice, mut alice_events), (_bob, mut bob_events)) = session_pair(1000);

    let content: Vec<u8> = (0..25_000u32).map(|i| (i % 251) as u8).collect();
    let message_id = alice.send(Bytes::from(content.clone()), "application/octet-stream").unwrap();

    match next_event(&mut bob_events).await {
        MsrpEvent::DataReceived { message_id: received_id, data, .. } => {
            assert_eq!(received_id, message_id);
            assert_eq!(data.len(), content.len());
            assert_eq!(&data[..], &content[..]);
        }
        other => panic!("unexpected event {:?}", other),
    }
    // Only the last chunk's acknowledgement completes the transfer.
    assert_eq!(next_event(&mut alice_events).await, MsrpEvent::DataTransferred { message_id });
}

#[tokio::test]
async fn test_empty_chunk_reaches_peer_as_empty_data() {
    let ((alice, mut alice_events), (_bob, mut bob_events)) = session_pair(1024);

    alice.send_empty_chunk().unwrap();
    match next_event(&mut bob_events).await {
        MsrpEvent::DataReceived { data, content_type, .. } => {
            assert!(data.is_empty());
            assert_eq!(content_type, None);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Keep-alive acknowledgements are not reported as transfers.
    let quiet = timeout(Duration::from_millis(200), alice_events.recv()).await;
    assert!(quiet.is_err());
}

#[tokio::test]
async fn test_message_size_limit() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let alice = MsrpPath::new("127.0.0.1", 7777, "alice");
    let bob = MsrpPath::new("127.0.0.1", 8888, "bob");
    let (sender, mut sender_events) = MsrpSession::open(
        a,
        MsrpSessionConfig::new(alice.clone(), bob.clone()).with_max_chunk_size(100),
    );
    let (_receiver, mut receiver_events) = MsrpSession::open(
        b,
        MsrpSessionConfig::new(bob, alice)
            .with_max_chunk_size(100)
            .with_max_message_size(150),
    );

    let message_id = sender.send(Bytes::from(vec![b'x'; 300]), "text/plain").unwrap();
    match next_event(&mut sender_events).await {
        MsrpEvent::TransferError { message_id: failed, chunk_type, error } => {
            assert_eq!(failed.as_deref(), Some(message_id.as_str()));
            assert_eq!(chunk_type, ChunkType::TextMessage);
            assert!(error.starts_with("413"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    let nothing = timeout(Duration::from_millis(200), receiver_events.recv()).await;
    assert!(nothing.is_err());
    // the remaining chunk of the refused message raises nothing more
    let quiet = timeout(Duration::from_millis(200), sender_events.recv()).await;
    assert!(quiet.is_err());
}

#[tokio::test]
async fn test_peer_may_send_chunks_up_to_our_limit() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let alice = MsrpPath::new("127.0.0.1", 7777, "alice");
    let bob = MsrpPath::new("127.0.0.1", 8888, "bob");
    // alice splits at 1024 because bob advertised it; she still accepts 10240
    let (_alice, mut alice_events) = MsrpSession::open(
        a,
        MsrpSessionConfig::new(alice.clone(), bob.clone())
            .with_max_chunk_size(1024)
            .with_max_incoming_chunk_size(10240),
    );
    let (bob_session, mut bob_events) =
        MsrpSession::open(b, MsrpSessionConfig::new(bob, alice).with_max_chunk_size(10240));

    let message_id = bob_session.send(Bytes::from(vec![b'y'; 8000]), "text/plain").unwrap();
    match next_event(&mut alice_events).await {
        MsrpEvent::DataReceived { message_id: received, data, .. } => {
            assert_eq!(received, message_id);
            assert_eq!(data.len(), 8000);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(next_event(&mut bob_events).await, MsrpEvent::DataTransferred { message_id });
}

#[tokio::test]
async fn test_chunk_above_our_limit_is_refused() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let alice = MsrpPath::new("127.0.0.1", 7777, "alice");
    let bob = MsrpPath::new("127.0.0.1", 8888, "bob");
    let (_alice, mut alice_events) = MsrpSession::open(
        a,
        MsrpSessionConfig::new(alice.clone(), bob.clone()).with_max_incoming_chunk_size(1024),
    );
    let (bob_session, _bob_events) =
        MsrpSession::open(b, MsrpSessionConfig::new(bob, alice).with_max_chunk_size(10240));

    bob_session.send(Bytes::from(vec![b'z'; 8000]), "text/plain").unwrap();
    match next_event(&mut alice_events).await {
        MsrpEvent::TransferError { message_id, chunk_type, .. } => {
            assert_eq!(message_id, None);
            assert_eq!(chunk_type, ChunkType::Unknown);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_close_is_idempotent_and_notifies_peer() {
    let ((alice, _alice_events), (_bob, mut bob_events)) = session_pair(1024);

    alice.close();
    alice.close();
    assert!(alice.is_closed());
    assert!(alice.send(Bytes::from_static(b"late"), "text/plain").is_err());

    assert_eq!(next_event(&mut bob_events).await, MsrpEvent::ConnectionClosed);
}

#[tokio::test(start_paused = true)]
async fn test_activity_monitor_fires_once() {
    let fired = Arc::new(AtomicUsize::new(0));
    let monitor = ActivityMonitor::new(Duration::from_secs(5), Duration::from_secs(1));

    let counter = fired.clone();
    monitor.start(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(monitor.is_running());

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!monitor.is_running());

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_activity_keeps_monitor_quiet() {
    let fired = Arc::new(AtomicUsize::new(0));
    let monitor = ActivityMonitor::new(Duration::from_secs(5), Duration::from_secs(1));

    let counter = fired.clone();
    monitor.start(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(2)).await;
        monitor.update();
    }
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    monitor.stop();
    monitor.stop();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(!monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_zero_threshold_disables_monitor() {
    let monitor = ActivityMonitor::new(Duration::ZERO, Duration::from_secs(1));
    monitor.start(|| panic!("disabled monitor fired"));
    assert!(!monitor.is_running());
    tokio::time::sleep(Duration::from_secs(60)).await;
}
