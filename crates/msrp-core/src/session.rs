//! MSRP transport session
//!
//! An [`MsrpSession`] owns one connection. Outgoing messages are split into
//! chunks and queued to a writer task; a reader task answers incoming SEND
//! requests, reassembles messages and matches transaction responses. Results
//! are reported on the event channel returned by [`MsrpSession::open`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, trace, warn};

use crate::activity::{ActivityMonitor, DEFAULT_CHECK_INTERVAL};
use crate::chunk::{ByteRange, ChunkType, ContinuationFlag, MsrpChunk, StartLine, METHOD_REPORT, METHOD_SEND};
use crate::codec::MsrpCodec;
use crate::error::{MsrpError, Result};
use crate::path::MsrpPath;

pub const DEFAULT_MAX_CHUNK_SIZE: usize = 10 * 1024;
const DEFAULT_CHANNEL_CAPACITY: usize = 100;
const TRANSACTION_ID_LEN: usize = 10;
/// Messages the peer may leave unfinished at once
const MAX_PARTIAL_MESSAGES: usize = 64;

/// Configuration of one MSRP session
#[derive(Debug, Clone)]
pub struct MsrpSessionConfig {
    pub local_path: MsrpPath,
    pub remote_path: MsrpPath,
    /// Largest body sent in one chunk
    pub max_chunk_size: usize,
    /// Largest chunk body accepted from the peer, as advertised in our SDP
    pub max_incoming_chunk_size: usize,
    /// Largest reassembled message, 0 for unlimited
    pub max_message_size: usize,
    /// Idle time before the inactivity event, 0 disables it
    pub idle_threshold: Duration,
    pub activity_check_interval: Duration,
    pub channel_capacity: usize,
}

impl MsrpSessionConfig {
    pub fn new(local_path: MsrpPath, remote_path: MsrpPath) -> Self {
        Self {
            local_path,
            remote_path,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_incoming_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_message_size: 0,
            idle_threshold: Duration::ZERO,
            activity_check_interval: DEFAULT_CHECK_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Chunk size used when splitting outgoing messages
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size.max(1);
        self
    }

    pub fn with_max_incoming_chunk_size(mut self, max_incoming_chunk_size: usize) -> Self {
        self.max_incoming_chunk_size = max_incoming_chunk_size.max(1);
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_idle_threshold(mut self, idle_threshold: Duration, check_interval: Duration) -> Self {
        self.idle_threshold = idle_threshold;
        self.activity_check_interval = check_interval;
        self
    }
}

/// Outcome notifications of an MSRP session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsrpEvent {
    /// Every chunk of a sent message was acknowledged
    DataTransferred { message_id: String },
    /// A complete message arrived; keep-alives arrive with empty `data`
    DataReceived {
        message_id: String,
        data: Bytes,
        content_type: Option<String>,
    },
    /// Sending or receiving failed
    TransferError {
        message_id: Option<String>,
        error: String,
        chunk_type: ChunkType,
    },
    /// The peer closed the connection
    ConnectionClosed,
}

#[derive(Debug, Clone)]
struct PendingChunk {
    message_id: String,
    last: bool,
    chunk_type: ChunkType,
}

/// State shared between the session handle and its I/O tasks
struct Shared {
    closed: AtomicBool,
    pending: DashMap<String, PendingChunk>,
    activity: ActivityMonitor,
    events_tx: mpsc::Sender<MsrpEvent>,
    outbound_tx: mpsc::UnboundedSender<MsrpChunk>,
}

struct MsrpSessionInner {
    config: MsrpSessionConfig,
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// One MSRP session over an established connection
#[derive(Clone)]
pub struct MsrpSession {
    inner: Arc<MsrpSessionInner>,
}

fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TRANSACTION_ID_LEN)
        .map(char::from)
        .collect()
}

impl MsrpSession {
    /// Start a session over `stream`
    pub fn open<S>(stream: S, config: MsrpSessionConfig) -> (Self, mpsc::Receiver<MsrpEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            pending: DashMap::new(),
            activity: ActivityMonitor::new(config.idle_threshold, config.activity_check_interval),
            events_tx,
            outbound_tx,
        });

        let (read_half, write_half) = tokio::io::split(stream);
        let reader = FramedRead::new(read_half, MsrpCodec::new(config.max_incoming_chunk_size));
        let writer = FramedWrite::new(write_half, MsrpCodec::new(config.max_chunk_size));

        info!("MSRP session opened {} -> {}", config.local_path, config.remote_path);
        let tasks = vec![
            tokio::spawn(receive_loop(reader, shared.clone(), config.max_message_size)),
            tokio::spawn(send_loop(writer, outbound_rx, shared.clone())),
        ];

        let session = MsrpSession {
            inner: Arc::new(MsrpSessionInner {
                config,
                shared,
                tasks: Mutex::new(tasks),
            }),
        };
        (session, events_rx)
    }

    pub fn local_path(&self) -> &MsrpPath {
        &self.inner.config.local_path
    }

    pub fn remote_path(&self) -> &MsrpPath {
        &self.inner.config.remote_path
    }

    /// Activity monitor fed by every chunk of this session
    pub fn activity(&self) -> &ActivityMonitor {
        &self.inner.shared.activity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shared.closed.load(Ordering::Acquire)
    }

    /// Queue `content` for sending and return its message id
    ///
    /// Completion is reported as [`MsrpEvent::DataTransferred`] or
    /// [`MsrpEvent::TransferError`].
    pub fn send(&self, content: Bytes, content_type: &str) -> Result<String> {
        if self.is_closed() {
            return Err(MsrpError::Closed);
        }
        if content.is_empty() {
            return self.send_empty_chunk();
        }
        let max_message_size = self.inner.config.max_message_size;
        if max_message_size > 0 && content.len() > max_message_size {
            return Err(MsrpError::MessageTooLarge {
                size: content.len(),
                max: max_message_size,
            });
        }

        let message_id = random_id();
        let total = content.len();
        let chunk_size = self.inner.config.max_chunk_size.max(1);
        let chunk_type = ChunkType::from_content_type(Some(content_type), total);
        let mut offset = 0;
        while offset < total {
            let end = (offset + chunk_size).min(total);
            let flag = if end == total {
                ContinuationFlag::Complete
            } else {
                ContinuationFlag::More
            };
            let chunk = self.build_send(
                &message_id,
                ByteRange::new(offset as u64 + 1, end as u64, total as u64),
                Some(content_type),
                content.slice(offset..end),
                flag,
            );
            self.queue(chunk, &message_id, end == total, chunk_type)?;
            offset = end;
        }
        debug!("Queued message {} ({} bytes, {})", message_id, total, content_type);
        self.inner.shared.activity.update();
        Ok(message_id)
    }

    /// Send a zero-length keep-alive chunk
    pub fn send_empty_chunk(&self) -> Result<String> {
        if self.is_closed() {
            return Err(MsrpError::Closed);
        }
        let message_id = random_id();
        let chunk = self.build_send(
            &message_id,
            ByteRange::new(1, 0, 0),
            None,
            Bytes::new(),
            ContinuationFlag::Complete,
        );
        self.queue(chunk, &message_id, true, ChunkType::EmptyChunk)?;
        trace!("Queued empty chunk {}", message_id);
        Ok(message_id)
    }

    fn build_send(
        &self,
        message_id: &str,
        range: ByteRange,
        content_type: Option<&str>,
        body: Bytes,
        flag: ContinuationFlag,
    ) -> MsrpChunk {
        MsrpChunk::send(
            random_id(),
            &self.inner.config.remote_path.to_string(),
            &self.inner.config.local_path.to_string(),
            message_id,
            range,
            content_type,
            body,
            flag,
        )
    }

    fn queue(&self, chunk: MsrpChunk, message_id: &str, last: bool, chunk_type: ChunkType) -> Result<()> {
        let shared = &self.inner.shared;
        shared.pending.insert(
            chunk.transaction_id.clone(),
            PendingChunk {
                message_id: message_id.to_string(),
                last,
                chunk_type,
            },
        );
        shared.outbound_tx.send(chunk).map_err(|_| MsrpError::Closed)
    }

    /// Close the session; closing twice does nothing
    pub fn close(&self) {
        self.inner.close();
    }
}

impl MsrpSessionInner {
    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.activity.stop();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.shared.pending.clear();
        info!("MSRP session closed {}", self.config.local_path);
    }
}

impl Drop for MsrpSessionInner {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MsrpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MsrpSession({} -> {})", self.inner.config.local_path, self.inner.config.remote_path)
    }
}

async fn send_loop<W>(
    mut writer: FramedWrite<W, MsrpCodec>,
    mut outbound_rx: mpsc::UnboundedReceiver<MsrpChunk>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Send + Unpin,
{
    while let Some(chunk) = outbound_rx.recv().await {
        let transaction_id = chunk.transaction_id.clone();
        if let Err(e) = writer.send(chunk).await {
            if shared.closed.load(Ordering::Acquire) {
                break;
            }
            error!("Failed to write MSRP chunk {}: {}", transaction_id, e);
            let pending = shared.pending.remove(&transaction_id).map(|(_, p)| p);
            let _ = shared
                .events_tx
                .send(MsrpEvent::TransferError {
                    message_id: pending.as_ref().map(|p| p.message_id.clone()),
                    error: e.to_string(),
                    chunk_type: pending.map_or(ChunkType::Unknown, |p| p.chunk_type),
                })
                .await;
            break;
        }
        shared.activity.update();
    }
    trace!("MSRP send loop terminated");
}

async fn receive_loop<R>(mut reader: FramedRead<R, MsrpCodec>, shared: Arc<Shared>, max_message_size: usize)
where
    R: AsyncRead + Send + Unpin,
{
    let mut incoming = Reassembly::default();

    while let Some(result) = reader.next().await {
        let chunk = match result {
            Ok(chunk) => chunk,
            Err(e) => {
                if shared.closed.load(Ordering::Acquire) {
                    return;
                }
                warn!("Error reading MSRP stream: {}", e);
                let _ = shared
                    .events_tx
                    .send(MsrpEvent::TransferError {
                        message_id: None,
                        error: e.to_string(),
                        chunk_type: ChunkType::Unknown,
                    })
                    .await;
                return;
            }
        };
        shared.activity.update();

        let event = if chunk.method() == Some(METHOD_SEND) {
            handle_send(&shared, &mut incoming, chunk, max_message_size)
        } else if chunk.method() == Some(METHOD_REPORT) {
            handle_report(&chunk)
        } else if let Some(status) = chunk.status() {
            handle_response(&shared, &chunk, status)
        } else {
            debug!("Unsupported MSRP method {:?}", chunk.method());
            respond(&shared, &chunk, 501, "Unknown method");
            None
        };

        if let Some(event) = event {
            if shared.events_tx.send(event).await.is_err() {
                debug!("MSRP event receiver dropped");
                return;
            }
        }
    }

    if !shared.closed.load(Ordering::Acquire) {
        info!("MSRP connection closed by peer");
        let _ = shared.events_tx.send(MsrpEvent::ConnectionClosed).await;
    }
}

fn respond(shared: &Shared, request: &MsrpChunk, status: u16, comment: &str) {
    if request.wants_response() {
        let _ = shared.outbound_tx.send(MsrpChunk::response_to(request, status, comment));
    }
}

/// Partially received messages of one session
#[derive(Default)]
struct Reassembly {
    buffers: HashMap<String, BytesMut>,
    rejected: HashSet<String>,
}

impl Reassembly {
    /// Drop the rest of `message_id`; the set is bounded like the buffers
    fn reject(&mut self, message_id: String) {
        if self.rejected.len() >= MAX_PARTIAL_MESSAGES {
            self.rejected.clear();
        }
        self.rejected.insert(message_id);
    }
}

fn handle_send(
    shared: &Shared,
    incoming: &mut Reassembly,
    chunk: MsrpChunk,
    max_message_size: usize,
) -> Option<MsrpEvent> {
    let message_id = match chunk.message_id() {
        Some(id) => id.to_string(),
        None => {
            respond(shared, &chunk, 400, "Missing Message-ID");
            return None;
        }
    };

    let buffered = incoming.buffers.get(&message_id).map_or(0, |b| b.len());
    let too_large = max_message_size > 0 && buffered + chunk.body.len() > max_message_size;
    if too_large || incoming.rejected.contains(&message_id) {
        if too_large {
            warn!("Message {} exceeds {} bytes, rejecting", message_id, max_message_size);
        }
        incoming.buffers.remove(&message_id);
        if chunk.flag == ContinuationFlag::More {
            incoming.reject(message_id);
        } else {
            incoming.rejected.remove(&message_id);
        }
        respond(shared, &chunk, 413, "Message too large");
        return None;
    }
    if chunk.flag == ContinuationFlag::More
        && !incoming.buffers.contains_key(&message_id)
        && incoming.buffers.len() >= MAX_PARTIAL_MESSAGES
    {
        warn!("Too many partial messages, rejecting {}", message_id);
        incoming.reject(message_id);
        respond(shared, &chunk, 413, "Too many partial messages");
        return None;
    }
    respond(shared, &chunk, 200, "OK");

    match chunk.flag {
        ContinuationFlag::More => {
            incoming.buffers.entry(message_id).or_default().extend_from_slice(&chunk.body);
            None
        }
        ContinuationFlag::Aborted => {
            debug!("Message {} aborted by sender", message_id);
            incoming.buffers.remove(&message_id);
            None
        }
        ContinuationFlag::Complete => {
            let data = match incoming.buffers.remove(&message_id) {
                Some(mut buffer) => {
                    buffer.extend_from_slice(&chunk.body);
                    buffer.freeze()
                }
                None => chunk.body.clone(),
            };
            trace!("Received message {} ({} bytes)", message_id, data.len());
            Some(MsrpEvent::DataReceived {
                message_id,
                data,
                content_type: chunk.content_type().map(str::to_string),
            })
        }
    }
}

fn handle_report(report: &MsrpChunk) -> Option<MsrpEvent> {
    let message_id = report.message_id()?.to_string();
    match report.report_status() {
        Some(status) if (200..300).contains(&status) => {
            debug!("Success report for {}", message_id);
            None
        }
        Some(status) => Some(MsrpEvent::TransferError {
            message_id: Some(message_id),
            error: format!("report status {}", status),
            chunk_type: ChunkType::Unknown,
        }),
        None => None,
    }
}

fn handle_response(shared: &Shared, response: &MsrpChunk, status: u16) -> Option<MsrpEvent> {
    let (_, pending) = match shared.pending.remove(&response.transaction_id) {
        Some(entry) => entry,
        None => {
            trace!("Response {} for unknown transaction {}", status, response.transaction_id);
            return None;
        }
    };

    if (200..300).contains(&status) {
        if pending.last && pending.chunk_type != ChunkType::EmptyChunk {
            Some(MsrpEvent::DataTransferred {
                message_id: pending.message_id,
            })
        } else {
            None
        }
    } else {
        warn!("Chunk of {} refused with {}", pending.message_id, status);
        // the other chunks of a failed message get no event
        shared.pending.retain(|_, other| other.message_id != pending.message_id);
        let comment = match &response.start_line {
            StartLine::Response { comment: Some(comment), .. } => comment.as_str(),
            _ => "",
        };
        Some(MsrpEvent::TransferError {
            message_id: Some(pending.message_id),
            error: format!("{} {}", status, comment).trim().to_string(),
            chunk_type: pending.chunk_type,
        })
    }
}
