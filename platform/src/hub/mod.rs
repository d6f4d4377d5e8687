//! Live build log fan-out
//!
//! A single task owns the subscriber map and applies subscribe, unsubscribe
//! and broadcast commands one at a time in the order they were sent. A
//! subscriber registered before a broadcast is sent receives it; one removed
//! before a broadcast is sent does not. Nothing is buffered for late
//! subscribers.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::models::deployment::LogChunk;

pub type SubscriberId = Uuid;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("subscriber disconnected")]
    Disconnected,

    #[error("log hub is not running")]
    Stopped,
}

/// Receiving end of a live log subscription
pub trait LogSink: Send + 'static {
    /// Deliver one chunk. An error drops the sink from the hub.
    fn deliver(&mut self, chunk: &LogChunk) -> Result<(), HubError>;
}

impl LogSink for mpsc::UnboundedSender<Bytes> {
    fn deliver(&mut self, chunk: &LogChunk) -> Result<(), HubError> {
        self.send(chunk.bytes.clone())
            .map_err(|_| HubError::Disconnected)
    }
}

enum Command {
    Subscribe {
        deploy_id: String,
        id: SubscriberId,
        sink: Box<dyn LogSink>,
    },
    Unsubscribe {
        deploy_id: String,
        id: SubscriberId,
    },
    Broadcast(LogChunk),
    Count {
        deploy_id: String,
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Handle to the log hub task. Cheap to clone.
#[derive(Clone)]
pub struct LogHub {
    tx: mpsc::UnboundedSender<Command>,
}

impl LogHub {
    /// Start the hub task
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(rx));
        (Self { tx }, handle)
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            trace!("log hub stopped, command dropped");
        }
    }

    /// Register `sink` for `deploy_id`. Returns without waiting for the hub
    /// to apply the registration.
    pub fn subscribe(&self, deploy_id: &str, sink: impl LogSink) -> SubscriberId {
        let id = Uuid::new_v4();
        self.send(Command::Subscribe {
            deploy_id: deploy_id.to_string(),
            id,
            sink: Box::new(sink),
        });
        id
    }

    /// Subscribe with a channel and hand back its receiving end
    pub fn subscribe_channel(&self, deploy_id: &str) -> (SubscriberId, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(deploy_id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, deploy_id: &str, id: SubscriberId) {
        self.send(Command::Unsubscribe {
            deploy_id: deploy_id.to_string(),
            id,
        });
    }

    /// Fan `bytes` out to every current subscriber of `deploy_id`
    pub fn broadcast(&self, deploy_id: &str, bytes: impl Into<Bytes>) {
        self.send(Command::Broadcast(LogChunk {
            deploy_id: deploy_id.to_string(),
            bytes: bytes.into(),
        }));
    }

    /// Number of live subscribers for `deploy_id`.
    ///
    /// Answered in command order, so every command sent before this call has
    /// been applied when it returns.
    pub async fn subscriber_count(&self, deploy_id: &str) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Count {
                deploy_id: deploy_id.to_string(),
                reply,
            })
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Stop the hub task after it has applied every command sent so far
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>) {
    info!("Log hub started");

    let mut subscribers: HashMap<String, HashMap<SubscriberId, Box<dyn LogSink>>> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Subscribe { deploy_id, id, sink } => {
                debug!(deploy_id = %deploy_id, subscriber = %id, "log subscriber added");
                subscribers.entry(deploy_id).or_default().insert(id, sink);
            }
            Command::Unsubscribe { deploy_id, id } => {
                remove_subscriber(&mut subscribers, &deploy_id, &id);
                debug!(deploy_id = %deploy_id, subscriber = %id, "log subscriber removed");
            }
            Command::Broadcast(chunk) => {
                let Some(set) = subscribers.get_mut(&chunk.deploy_id) else {
                    continue;
                };

                let failed: Vec<SubscriberId> = set
                    .iter_mut()
                    .filter_map(|(id, sink)| sink.deliver(&chunk).err().map(|_| *id))
                    .collect();

                for id in failed {
                    debug!(deploy_id = %chunk.deploy_id, subscriber = %id, "dropping disconnected log subscriber");
                    remove_subscriber(&mut subscribers, &chunk.deploy_id, &id);
                }
            }
            Command::Count { deploy_id, reply } => {
                let count = subscribers.get(&deploy_id).map_or(0, HashMap::len);
                let _ = reply.send(count);
            }
            Command::Shutdown => break,
        }
    }

    info!("Log hub stopped");
}

fn remove_subscriber(
    subscribers: &mut HashMap<String, HashMap<SubscriberId, Box<dyn LogSink>>>,
    deploy_id: &str,
    id: &SubscriberId,
) {
    if let Some(set) = subscribers.get_mut(deploy_id) {
        set.remove(id);
        if set.is_empty() {
            subscribers.remove(deploy_id);
        }
    }
}
