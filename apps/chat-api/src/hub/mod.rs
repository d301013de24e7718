//! Fanout hub: connection registry, local broadcast, broker relay, presence
//! and inbound frame routing.
//!
//! The hub is an owned value shared through `AppState`; there is no global
//! instance. Without a broker it runs in single-process mode.

pub mod broadcast;
pub mod channel;
pub mod connection;
pub mod events;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod router;

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;

use broadcast::Broadcaster;
use channel::Category;
use presence::PresenceTracker;
use registry::ConnectionRegistry;
use relay::{PubSubRelay, PublishError, RetryPolicy};
use router::EventRouter;

pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    relay: Arc<PubSubRelay>,
    presence: Arc<PresenceTracker>,
    router: EventRouter,
    shutdown: CancellationToken,
}

impl Hub {
    pub fn new(broker: Option<Arc<dyn Broker>>) -> Self {
        Self::with_retry_policy(broker, RetryPolicy::default())
    }

    pub fn with_retry_policy(broker: Option<Arc<dyn Broker>>, policy: RetryPolicy) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let relay = Arc::new(PubSubRelay::new(
            broker.clone(),
            registry.clone(),
            broadcaster,
            policy,
        ));
        let presence = Arc::new(PresenceTracker::new(broker, relay.clone()));
        let router = EventRouter::new(relay.clone(), presence.clone());

        Self {
            registry,
            relay,
            presence,
            router,
            shutdown: CancellationToken::new(),
        }
    }

    /// Start the broker subscription task. Returns `None` in single-process mode.
    pub fn spawn_subscriber(&self) -> Option<JoinHandle<()>> {
        if !self.relay.has_broker() {
            tracing::info!("no broker configured; running in single-process mode");
            return None;
        }
        let relay = self.relay.clone();
        let shutdown = self.shutdown.clone();
        Some(tokio::spawn(relay.run_subscriber(shutdown)))
    }

    /// Stop the subscription task. Connection tasks end on their own.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn has_broker(&self) -> bool {
        self.relay.has_broker()
    }

    /// See [`PubSubRelay::publish`].
    pub async fn publish<T: Serialize + ?Sized + Sync>(
        &self,
        room: &str,
        category: Category,
        event: &T,
    ) -> Result<(), PublishError> {
        self.relay.publish(room, category, event).await
    }
}
