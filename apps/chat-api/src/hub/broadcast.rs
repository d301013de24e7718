//! Local fanout: one serialization, one enqueue per connection in the room.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;

use super::connection::Connection;
use super::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Serialize `event` once and write it to every local connection of `room`.
    ///
    /// Returns the number of connections that queued the frame. An empty
    /// room returns 0 without serializing.
    pub fn broadcast_local<T: Serialize + ?Sized>(&self, room: &str, event: &T) -> usize {
        let conns = self.registry.snapshot(room);
        if conns.is_empty() {
            return 0;
        }
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(?e, room, "failed to serialize broadcast event");
                return 0;
            }
        };
        deliver(room, &conns, Utf8Bytes::from(text))
    }

    /// Write an already-serialized payload to every local connection of `room`.
    pub fn broadcast_raw(&self, room: &str, payload: &[u8]) -> usize {
        let conns = self.registry.snapshot(room);
        if conns.is_empty() {
            return 0;
        }
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text.to_string(),
            Err(e) => {
                tracing::warn!(?e, room, "dropping non-utf8 payload");
                return 0;
            }
        };
        deliver(room, &conns, Utf8Bytes::from(text))
    }
}

/// Hands the frame to each connection's writer without waiting on any
/// transport. A connection whose queue is full or closed loses the frame and
/// is left for its own read loop to clean up.
fn deliver(room: &str, conns: &[Arc<Connection>], frame: Utf8Bytes) -> usize {
    conns
        .iter()
        .filter(|conn| match conn.send(frame.clone()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    connection_id = %conn.id(),
                    user_id = %conn.user_id(),
                    room,
                    error = %e,
                    "broadcast frame dropped"
                );
                false
            }
        })
        .count()
}
