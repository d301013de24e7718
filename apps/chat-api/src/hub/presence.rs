//! Short-lived per-(room, user) presence markers.
//!
//! Records live in the broker with a TTL, so a client that crashes or gets
//! partitioned simply lapses to "unknown" without an explicit offline signal.
//! Without a broker nothing is stored; the delta is only broadcast locally.

use std::sync::Arc;
use std::time::Duration;

use crate::broker::Broker;

use super::channel::Category;
use super::events::{Envelope, DEFAULT_STATUS};
use super::relay::{PubSubRelay, PublishError};

/// Lifetime of an unrefreshed presence record.
pub const PRESENCE_TTL: Duration = Duration::from_secs(60);

pub struct PresenceTracker {
    broker: Option<Arc<dyn Broker>>,
    relay: Arc<PubSubRelay>,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(broker: Option<Arc<dyn Broker>>, relay: Arc<PubSubRelay>) -> Self {
        Self {
            broker,
            relay,
            ttl: PRESENCE_TTL,
        }
    }

    /// Record `user`'s status in `room` and announce the change.
    ///
    /// `status` defaults to `"online"`. A failed record write is logged and the
    /// delta is still published.
    pub async fn update_presence(
        &self,
        room: &str,
        user_id: &str,
        status: Option<&str>,
    ) -> Result<(), PublishError> {
        let status = status.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_STATUS);
        let event = Envelope::presence(room, user_id, status);

        let Some(broker) = &self.broker else {
            self.relay.broadcaster().broadcast_local(room, &event);
            return Ok(());
        };

        if let Err(e) = broker.set_ex(&presence_key(room, user_id), status, self.ttl).await {
            tracing::warn!(room, user_id, error = %e, "failed to store presence record");
        }
        self.relay.publish(room, Category::Presence, &event).await
    }

    /// Current status, or `None` when unknown (expired, never set, or no broker).
    pub async fn status(&self, room: &str, user_id: &str) -> Option<String> {
        let broker = self.broker.as_ref()?;
        match broker.get(&presence_key(room, user_id)).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(room, user_id, error = %e, "failed to read presence record");
                None
            }
        }
    }
}

fn presence_key(room: &str, user_id: &str) -> String {
    format!("presence:{room}:{user_id}")
}
