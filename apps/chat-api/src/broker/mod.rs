//! Publish/subscribe broker used for cross-process fanout and presence records.
//!
//! Backed by Redis in production and an in-process implementation in tests.

pub mod memory;
pub mod redis_broker;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;

pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;

/// A message received on a pattern subscription.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    /// The concrete channel the message was published on.
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Stream of messages for a live subscription. Dropping it closes the
/// subscription.
pub type MessageStream = Pin<Box<dyn Stream<Item = BrokerMessage> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),
    #[error("broker command failed: {0}")]
    Command(String),
    #[error("broker operation timed out: {0}")]
    Timeout(String),
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a payload on a single channel.
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Store a string value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BrokerError>;

    async fn get(&self, key: &str) -> Result<Option<String>, BrokerError>;

    /// Open one subscription covering every glob pattern in `patterns`.
    async fn psubscribe(&self, patterns: &[String]) -> Result<MessageStream, BrokerError>;
}
