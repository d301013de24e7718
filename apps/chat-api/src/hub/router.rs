//! Inbound frame dispatch: typing, read receipts, presence.

use std::sync::Arc;

use super::channel::Category;
use super::events::{ClientFrame, Envelope};
use super::presence::PresenceTracker;
use super::relay::PubSubRelay;

/// What happened to an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Typing,
    Read,
    Presence,
    Dropped,
}

pub struct EventRouter {
    relay: Arc<PubSubRelay>,
    presence: Arc<PresenceTracker>,
}

impl EventRouter {
    pub fn new(relay: Arc<PubSubRelay>, presence: Arc<PresenceTracker>) -> Self {
        Self { relay, presence }
    }

    /// Handle one raw frame from a connection in `room` owned by `user_id`.
    ///
    /// Never fails: malformed or unknown frames are logged and dropped, and
    /// relay errors are logged.
    pub async fn handle_client_frame(&self, room: &str, user_id: &str, raw: &[u8]) -> Dispatch {
        let frame = match ClientFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(room, user_id, error = %e, "dropping malformed frame");
                return Dispatch::Dropped;
            }
        };

        let (dispatch, result) = match frame {
            ClientFrame::Typing { stopped } => {
                let event = Envelope::typing(room, user_id, stopped);
                (Dispatch::Typing, self.relay.publish(room, Category::Events, &event).await)
            }
            ClientFrame::Read { last_read_id } => {
                let event = Envelope::read(room, user_id, last_read_id);
                (Dispatch::Read, self.relay.publish(room, Category::Events, &event).await)
            }
            ClientFrame::Presence { status } => {
                let result = self
                    .presence
                    .update_presence(room, user_id, status.as_deref())
                    .await;
                (Dispatch::Presence, result)
            }
            ClientFrame::Unknown => {
                tracing::debug!(room, user_id, "dropping frame with unknown type");
                return Dispatch::Dropped;
            }
        };

        if let Err(e) = result {
            tracing::warn!(room, user_id, ?dispatch, error = %e, "failed to relay client event");
        }
        dispatch
    }
}
