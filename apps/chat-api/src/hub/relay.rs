//! Cross-process relay over the broker.
//!
//! Outgoing events are published on `<category>:conversation:<room>` with a
//! bounded retry budget; once the budget is spent the event is delivered to
//! local connections only. A single subscriber task per hub pattern-subscribes
//! to every category and hands received payloads to the local broadcaster.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, BrokerError, BrokerMessage};

use super::broadcast::Broadcaster;
use super::channel::{parse_channel, Category};
use super::registry::ConnectionRegistry;

/// First delay before resubscribing after the subscription drops.
const RESUBSCRIBE_BASE_DELAY: Duration = Duration::from_millis(100);

/// Cap on the resubscribe delay.
const RESUBSCRIBE_MAX_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Attempt budget and backoff schedule for broker publishes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each failure.
    pub base_delay: Duration,
    /// Upper bound (inclusive) of the random jitter added to every delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Nominal delay after failed attempt `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }

    /// Random jitter in `0..=max_jitter`.
    pub fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    /// State after attempt `attempt` finished with `outcome`.
    pub fn next_state(&self, attempt: u32, outcome: Result<(), BrokerError>) -> PublishState {
        match outcome {
            Ok(()) => PublishState::Done,
            Err(e) if attempt >= self.max_attempts => PublishState::Fallback(e),
            Err(_) => PublishState::Attempting(attempt + 1),
        }
    }
}

/// Publish progress: `Attempting(k)` → … → `Done` or `Fallback`.
#[derive(Debug)]
pub enum PublishState {
    /// About to make attempt `k` (1-based).
    Attempting(u32),
    /// Budget exhausted; carries the last broker error.
    Fallback(BrokerError),
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Delivered locally only; other processes did not get the event.
    #[error("broker publish failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: BrokerError,
    },
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

pub struct PubSubRelay {
    broker: Option<Arc<dyn Broker>>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    policy: RetryPolicy,
}

impl PubSubRelay {
    pub fn new(
        broker: Option<Arc<dyn Broker>>,
        registry: Arc<ConnectionRegistry>,
        broadcaster: Broadcaster,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            broker,
            registry,
            broadcaster,
            policy,
        }
    }

    pub fn has_broker(&self) -> bool {
        self.broker.is_some()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Publish `event` for `room` on the `category` channel.
    ///
    /// Without a broker the event goes to local connections and this returns
    /// `Ok`. With a broker, `Ok` means the broker accepted the event. After
    /// the retry budget is spent the event is broadcast locally and the last
    /// broker error is returned; callers should log it, never fail the
    /// request that produced the event.
    pub async fn publish<T: Serialize + ?Sized + Sync>(
        &self,
        room: &str,
        category: Category,
        event: &T,
    ) -> Result<(), PublishError> {
        let Some(broker) = &self.broker else {
            tracing::debug!(room, %category, "publish local (no broker configured)");
            self.broadcaster.broadcast_local(room, event);
            return Ok(());
        };

        let payload = serde_json::to_vec(event)?;
        let channel = category.channel(room);
        let mut state = PublishState::Attempting(1);

        loop {
            state = match state {
                PublishState::Attempting(attempt) => {
                    let outcome = broker.publish(&channel, &payload).await;
                    if let Err(e) = &outcome {
                        tracing::warn!(room, %category, attempt, error = %e, "broker publish failed");
                    }
                    let next = self.policy.next_state(attempt, outcome);
                    if let PublishState::Attempting(_) = next {
                        let delay = self.policy.backoff(attempt) + self.policy.jitter();
                        tokio::time::sleep(delay).await;
                    } else if let PublishState::Done = next {
                        tracing::debug!(room, %category, attempt, "published");
                    }
                    next
                }
                PublishState::Fallback(source) => {
                    tracing::warn!(
                        room,
                        %category,
                        attempts = self.policy.max_attempts,
                        "publish failed; falling back to local broadcast"
                    );
                    self.broadcaster.broadcast_raw(room, &payload);
                    return Err(PublishError::Exhausted {
                        attempts: self.policy.max_attempts,
                        source,
                    });
                }
                PublishState::Done => return Ok(()),
            };
        }
    }

    /// Subscription loop. Returns when `shutdown` is cancelled, or at once
    /// when no broker is configured.
    ///
    /// A dropped subscription is re-established with capped exponential
    /// backoff; the backoff resets once a subscription delivers a message.
    pub async fn run_subscriber(self: Arc<Self>, shutdown: CancellationToken) {
        let Some(broker) = self.broker.clone() else {
            return;
        };
        let patterns: Vec<String> = Category::ALL.iter().map(|c| c.pattern()).collect();
        let mut delay = RESUBSCRIBE_BASE_DELAY;

        loop {
            let subscribed = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = broker.psubscribe(&patterns) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    tracing::info!(?patterns, "broker subscription started");
                    let mut received = false;
                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                drop(stream);
                                tracing::info!("broker subscription closed");
                                return;
                            }
                            msg = stream.next() => match msg {
                                Some(msg) => {
                                    received = true;
                                    self.relay_incoming(msg);
                                }
                                None => break,
                            }
                        }
                    }
                    drop(stream);
                    tracing::warn!("broker subscription dropped");
                    if received {
                        delay = RESUBSCRIBE_BASE_DELAY;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "broker subscribe failed");
                }
            }

            let wait = delay + self.policy.jitter();
            tracing::info!(?wait, "resubscribing to broker");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            delay = (delay * 2).min(RESUBSCRIBE_MAX_DELAY);
        }

        tracing::info!("broker subscriber stopped");
    }

    /// Hand one received broker message to local connections. Never waits on
    /// a transport, so one slow consumer cannot hold up the subscription.
    fn relay_incoming(&self, msg: BrokerMessage) {
        let Some((category, room)) = parse_channel(&msg.channel) else {
            tracing::warn!(channel = %msg.channel, "dropping message on malformed channel");
            return;
        };

        let local = self.registry.connection_count(room);
        if local == 0 {
            tracing::debug!(room, %category, "received event but no local clients");
            return;
        }

        tracing::debug!(room, %category, clients = local, "relaying event");
        self.broadcaster.broadcast_raw(room, &msg.payload);
    }
}
