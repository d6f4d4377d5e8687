//! In-process queue backend
//!
//! Each topic is an unbounded channel shared by all of its consumers, so
//! consumers compete for messages the way broker work queues do. A delivery
//! that is dropped before being acknowledged or rejected goes back on the
//! topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Acknowledger, Delivery, Queue, QueueError};

/// Counters for one topic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub published: u64,
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    acked: AtomicU64,
    rejected: AtomicU64,
    requeued: AtomicU64,
}

struct Topic {
    name: String,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    counters: Counters,
}

impl Topic {
    fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            tx,
            rx: tokio::sync::Mutex::new(rx),
            counters: Counters::default(),
        }
    }

    fn enqueue(&self, body: Vec<u8>) -> Result<(), QueueError> {
        self.tx.send(body).map_err(|_| QueueError::Publish {
            topic: self.name.clone(),
            reason: "topic closed".to_string(),
        })
    }
}

/// In-process at-least-once queue
#[derive(Default)]
pub struct MemoryQueue {
    topics: Mutex<HashMap<String, Arc<Topic>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, name: &str) -> Arc<Topic> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Topic::new(name)))
            .clone()
    }

    /// Snapshot of a topic's counters
    pub fn stats(&self, topic: &str) -> QueueStats {
        let topic = self.topic(topic);
        let c = &topic.counters;
        QueueStats {
            published: c.published.load(Ordering::SeqCst),
            acked: c.acked.load(Ordering::SeqCst),
            rejected: c.rejected.load(Ordering::SeqCst),
            requeued: c.requeued.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<(), QueueError> {
        let topic = self.topic(topic);
        topic.enqueue(body)?;
        topic.counters.published.fetch_add(1, Ordering::SeqCst);
        debug!(topic = %topic.name, "message published");
        Ok(())
    }

    async fn consume(&self, topic: &str) -> Result<BoxStream<'static, Delivery>, QueueError> {
        let topic = self.topic(topic);

        let deliveries = stream::unfold(topic, |topic| async move {
            let body = topic.rx.lock().await.recv().await?;
            let acker = MemoryAcker {
                topic: topic.clone(),
                body: Some(body.clone()),
            };
            Some((Delivery::new(body, Box::new(acker)), topic))
        });

        Ok(deliveries.boxed())
    }
}

struct MemoryAcker {
    topic: Arc<Topic>,
    /// Kept for requeueing; `None` once settled
    body: Option<Vec<u8>>,
}

impl MemoryAcker {
    fn requeue(&self, body: Vec<u8>) {
        if self.topic.enqueue(body).is_ok() {
            self.topic.counters.requeued.fetch_add(1, Ordering::SeqCst);
        } else {
            warn!(topic = %self.topic.name, "failed to requeue message, topic closed");
        }
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&mut self) -> Result<(), QueueError> {
        self.body.take().ok_or(QueueError::AlreadySettled)?;
        self.topic.counters.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reject(&mut self, requeue: bool) -> Result<(), QueueError> {
        let body = self.body.take().ok_or(QueueError::AlreadySettled)?;
        self.topic.counters.rejected.fetch_add(1, Ordering::SeqCst);
        if requeue {
            self.requeue(body);
        }
        Ok(())
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        if let Some(body) = self.body.take() {
            debug!(topic = %self.topic.name, "unsettled delivery dropped, requeueing");
            self.requeue(body);
        }
    }
}
