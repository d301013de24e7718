//! In-process broker for tests and single-binary setups.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream;
use glob::Pattern;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::{Broker, BrokerError, BrokerMessage, MessageStream};

/// Buffered messages per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 1024;

/// Broker that keeps expiring keys in a `DashMap` and fans messages out over a
/// `tokio::sync::broadcast` channel. Expiry uses tokio's clock so tests can
/// drive it with paused time.
pub struct MemoryBroker {
    values: DashMap<String, (String, Instant)>,
    sender: Mutex<broadcast::Sender<BrokerMessage>>,
    unavailable: AtomicBool,
    publish_attempts: AtomicUsize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            values: DashMap::new(),
            sender: Mutex::new(sender),
            unavailable: AtomicBool::new(false),
            publish_attempts: AtomicUsize::new(0),
        }
    }

    /// Make every command fail with a connection error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `publish` calls made so far, failed ones included.
    pub fn publish_attempts(&self) -> usize {
        self.publish_attempts.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.lock().receiver_count()
    }

    /// End every live subscription, as if the broker connection dropped.
    pub fn disconnect_subscribers(&self) {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        *self.sender.lock() = sender;
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection("broker unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.publish_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        // send() fails only when nobody is subscribed.
        let _ = self.sender.lock().send(BrokerMessage {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BrokerError> {
        self.check_available()?;
        self.values
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BrokerError> {
        self.check_available()?;
        let now = Instant::now();
        let value = match self.values.get(key) {
            Some(entry) if entry.1 > now => Some(entry.0.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if value.is_none() {
            self.values.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(value)
    }

    async fn psubscribe(&self, patterns: &[String]) -> Result<MessageStream, BrokerError> {
        self.check_available()?;
        let patterns: Arc<[Pattern]> = patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BrokerError::Command(format!("invalid pattern: {e}")))?
            .into();
        let receiver = self.sender.lock().subscribe();

        let messages = stream::unfold(receiver, move |mut receiver| {
            let patterns = patterns.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(msg) => {
                            if patterns.iter().any(|p| p.matches(&msg.channel)) {
                                return Some((msg, receiver));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "memory broker subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(messages))
    }
}
