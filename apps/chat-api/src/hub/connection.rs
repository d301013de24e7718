//! A live participant connection and its exclusive write path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Upper bound on a single outbound write. A consumer that cannot accept a
/// frame within this window loses that frame.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames a connection may have waiting behind its writer. Once full, new
/// frames for that connection are dropped.
pub const OUTBOUND_QUEUE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    Full,
    #[error("write failed: {0}")]
    Write(String),
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound half of a duplex transport.
///
/// Implementations must serialize writers so frames never interleave.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_text(&self, frame: Utf8Bytes) -> Result<(), TransportError>;
    async fn close(&self);
}

/// WebSocket write half behind an exclusive lock.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&self, frame: Utf8Bytes) -> Result<(), TransportError> {
        let mut sink = self.inner.lock().await;
        sink.send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.inner.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}

/// A registered participant: one transport, one room, one user.
///
/// Outbound frames go through a bounded queue drained by a per-connection
/// writer task, so a consumer that stops reading only ever stalls itself.
pub struct Connection {
    id: String,
    room: String,
    user_id: String,
    sink: Arc<dyn FrameSink>,
    outbound: mpsc::Sender<Utf8Bytes>,
    closed: AtomicBool,
    stop: CancellationToken,
}

impl Connection {
    /// Create the connection and spawn its writer. Must run inside a tokio runtime.
    pub fn new(room: impl Into<String>, user_id: impl Into<String>, sink: Arc<dyn FrameSink>) -> Arc<Self> {
        let (outbound, queue) = mpsc::channel(OUTBOUND_QUEUE);
        let conn = Arc::new(Self {
            id: chat_common::id::prefixed_ulid(chat_common::id::prefix::CONNECTION),
            room: room.into(),
            user_id: user_id.into(),
            sink: sink.clone(),
            outbound,
            closed: AtomicBool::new(false),
            stop: CancellationToken::new(),
        });
        tokio::spawn(write_loop(conn.id.clone(), sink, queue, conn.stop.clone()));
        conn
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue one text frame for the writer. Never waits on the transport.
    pub fn send(&self, frame: Utf8Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Full,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Stop the writer and close the transport. Only the first call reaches
    /// the sink; frames still queued are discarded.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop.cancel();
        self.sink.close().await;
    }
}

/// Drain `queue` into `sink` one frame at a time until the connection is
/// closed or dropped. A write in progress is abandoned on close.
async fn write_loop(
    connection_id: String,
    sink: Arc<dyn FrameSink>,
    mut queue: mpsc::Receiver<Utf8Bytes>,
    stop: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let written = tokio::select! {
            _ = stop.cancelled() => break,
            result = tokio::time::timeout(WRITE_TIMEOUT, sink.send_text(frame)) => {
                result.unwrap_or(Err(TransportError::Timeout(WRITE_TIMEOUT)))
            }
        };
        if let Err(e) = written {
            tracing::warn!(%connection_id, error = %e, "outbound write failed");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("room", &self.room)
            .field("user_id", &self.user_id)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn close_reaches_sink_once() {
        let (conn, sink) = connection("r1", "u1");
        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed());
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let (conn, sink) = connection("r1", "u1");
        conn.send(Utf8Bytes::from_static("\"a\"")).unwrap();
        sink.flushed(1).await;
        conn.close().await;
        assert!(matches!(
            conn.send(Utf8Bytes::from_static("\"b\"")),
            Err(TransportError::Closed)
        ));
        assert_eq!(sink.frames(), vec!["\"a\"".to_string()]);
    }

    #[tokio::test]
    async fn writer_preserves_queue_order() {
        let (conn, sink) = connection("r1", "u1");
        for n in 0..20 {
            conn.send(Utf8Bytes::from(n.to_string())).unwrap();
        }
        let seen: Vec<i64> = sink
            .flushed(20)
            .await
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn full_queue_rejects_without_waiting() {
        let conn = Connection::new("r1", "u1", Arc::new(StalledSink));

        for _ in 0..OUTBOUND_QUEUE {
            conn.send(Utf8Bytes::from_static("{}")).unwrap();
        }
        assert!(matches!(
            conn.send(Utf8Bytes::from_static("{}")),
            Err(TransportError::Full)
        ));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn close_abandons_a_stalled_write() {
        let conn = Connection::new("r1", "u1", Arc::new(StalledSink));
        conn.send(Utf8Bytes::from_static("{}")).unwrap();
        tokio::task::yield_now().await;

        tokio::time::timeout(Duration::from_secs(1), conn.close())
            .await
            .expect("close waited on the stalled write");
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn connection_ids_are_prefixed_and_unique() {
        let (a, _) = connection("r1", "u1");
        let (b, _) = connection("r1", "u1");
        assert!(a.id().starts_with("conn_"));
        assert_ne!(a.id(), b.id());
    }
}
