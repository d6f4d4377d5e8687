//! At-least-once message queue

pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use memory::{MemoryQueue, QueueStats};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("consume from {topic} failed: {reason}")]
    Consume { topic: String, reason: String },

    #[error("delivery already settled")]
    AlreadySettled,
}

/// Settles one delivery with the broker
#[async_trait]
pub trait Acknowledger: Send {
    async fn ack(&mut self) -> Result<(), QueueError>;

    async fn reject(&mut self, requeue: bool) -> Result<(), QueueError>;
}

/// A message pulled from a topic, to be settled exactly once
pub struct Delivery {
    body: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Self { body, acker }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Confirm processing; the message will not be redelivered
    pub async fn ack(mut self) -> Result<(), QueueError> {
        self.acker.ack().await
    }

    /// Give the message back, either for redelivery or to be dropped
    pub async fn reject(mut self, requeue: bool) -> Result<(), QueueError> {
        self.acker.reject(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Durable message channel
#[async_trait]
pub trait Queue: Send + Sync {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<(), QueueError>;

    /// Lazy stream of deliveries. A delivery dropped without being settled
    /// is redelivered.
    async fn consume(&self, topic: &str) -> Result<BoxStream<'static, Delivery>, QueueError>;
}
