//! Per-connection lifecycle: register, announce, read loop, cleanup.

use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};

use crate::hub::connection::{Connection, FrameSink};
use crate::hub::Hub;

/// Status announced when a user's last connection in a room goes away.
pub const OFFLINE_STATUS: &str = "offline";

/// Registry membership for one connection.
///
/// Dropping the guard without [`Registration::release`] (for example when
/// the connection task panics or is aborted) still deregisters the
/// connection and schedules the transport close.
pub struct Registration {
    hub: Arc<Hub>,
    conn: Arc<Connection>,
    released: bool,
}

impl Registration {
    pub fn register(hub: Arc<Hub>, conn: Arc<Connection>) -> Self {
        hub.registry().add(conn.clone());
        Self {
            hub,
            conn,
            released: false,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Deregister, then close the transport.
    pub async fn release(mut self) {
        self.released = true;
        self.hub.registry().remove(self.conn.room(), &self.conn);
        self.conn.close().await;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.hub.registry().remove(self.conn.room(), &self.conn);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let conn = self.conn.clone();
            handle.spawn(async move { conn.close().await });
        }
    }
}

/// Drive one authorized connection until the peer goes away.
///
/// `inbound` is the read half of the transport; `sink` the write half.
pub async fn run_connection<S>(
    hub: Arc<Hub>,
    room: String,
    user_id: String,
    sink: Arc<dyn FrameSink>,
    mut inbound: S,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let registration = Registration::register(hub.clone(), Connection::new(&room, &user_id, sink));
    let connection_id = registration.connection().id().to_string();
    tracing::info!(%connection_id, %room, %user_id, "connection established");

    if let Err(e) = hub.presence().update_presence(&room, &user_id, None).await {
        tracing::warn!(%room, %user_id, error = %e, "failed to announce presence");
    }

    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                hub.router()
                    .handle_client_frame(&room, &user_id, text.as_str().as_bytes())
                    .await;
            }
            Ok(Message::Close(_)) => break,
            // Pings are answered by the transport; binary frames are not part
            // of the protocol.
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "read error");
                break;
            }
        }
    }

    registration.release().await;

    if !hub.registry().user_connected(&room, &user_id) {
        if let Err(e) = hub
            .presence()
            .update_presence(&room, &user_id, Some(OFFLINE_STATUS))
            .await
        {
            tracing::warn!(%room, %user_id, error = %e, "failed to announce departure");
        }
    }

    tracing::info!(%connection_id, %room, %user_id, "connection ended");
}
