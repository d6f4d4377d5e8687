//! Deployment worker: consumes the deployment queue one message at a time

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::deploy::{Outcome, Pipeline};
use crate::models::deployment::QueueMessage;
use crate::queue::{Delivery, Queue};
use crate::store::DeploymentStore;

/// Deployer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Topic carrying deployment messages
    pub topic: String,

    /// Where unrecoverable messages are copied before being dropped
    pub dead_letter_topic: Option<String>,

    /// Delay before re-subscribing after the consume stream fails or ends
    pub retry_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            topic: "deployments".to_string(),
            dead_letter_topic: None,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// What happened to a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Pipeline ran (or was skipped) and the message was acknowledged
    Acked(Outcome),

    /// Message could not be processed and was rejected without requeue
    Dropped(String),
}

/// Run the deployer worker.
///
/// A message being processed when shutdown is signalled is finished and
/// settled first; no further message is taken afterwards.
pub async fn run<S, F>(
    options: &Options,
    queue: Arc<dyn Queue>,
    store: Arc<dyn DeploymentStore>,
    pipeline: Arc<Pipeline>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(topic = %options.topic, "Deployer worker starting...");

    loop {
        let consumed = tokio::select! {
            biased;
            _ = &mut shutdown_signal => {
                info!("Deployer worker shutting down...");
                return;
            }
            consumed = queue.consume(&options.topic) => consumed,
        };

        match consumed {
            Ok(mut deliveries) => loop {
                let delivery = tokio::select! {
                    biased;
                    _ = &mut shutdown_signal => {
                        info!("Deployer worker shutting down...");
                        return;
                    }
                    next = deliveries.next() => match next {
                        Some(delivery) => delivery,
                        None => {
                            warn!(topic = %options.topic, "Deployment queue stream ended");
                            break;
                        }
                    },
                };

                // Not raced against shutdown: the in-flight message always finishes
                handle_delivery(options, queue.as_ref(), store.as_ref(), &pipeline, delivery).await;
            },
            Err(e) => {
                error!(topic = %options.topic, "Failed to consume deployment queue: {}", e);
            }
        }

        tokio::select! {
            biased;
            _ = &mut shutdown_signal => {
                info!("Deployer worker shutting down...");
                return;
            }
            _ = sleep_fn(options.retry_delay) => {}
        }
    }
}

/// Process and settle one delivery
pub async fn handle_delivery(
    options: &Options,
    queue: &dyn Queue,
    store: &dyn DeploymentStore,
    pipeline: &Pipeline,
    delivery: Delivery,
) -> Handled {
    let message = match QueueMessage::decode(delivery.body()) {
        Ok(message) => message,
        Err(e) => {
            return drop_message(options, queue, delivery, format!("undecodable message: {}", e)).await;
        }
    };

    let deployment = match store.get(&message.deploy_id).await {
        Ok(Some(deployment)) => deployment,
        Ok(None) => {
            let reason = format!("deployment {} not found", message.deploy_id);
            return drop_message(options, queue, delivery, reason).await;
        }
        Err(e) => {
            let reason = format!("lookup of deployment {} failed: {}", message.deploy_id, e);
            return drop_message(options, queue, delivery, reason).await;
        }
    };

    info!(deploy_id = %message.deploy_id, "Processing deployment");
    let outcome = pipeline.process(deployment).await;

    if let Err(e) = delivery.ack().await {
        error!(deploy_id = %message.deploy_id, "Failed to acknowledge message: {}", e);
    }
    debug!(deploy_id = %message.deploy_id, outcome = ?outcome, "Message acknowledged");
    Handled::Acked(outcome)
}

async fn drop_message(
    options: &Options,
    queue: &dyn Queue,
    delivery: Delivery,
    reason: String,
) -> Handled {
    error!(topic = %options.topic, "Dropping deployment message: {}", reason);

    if let Some(topic) = &options.dead_letter_topic {
        match queue.publish(topic, delivery.body().to_vec()).await {
            Ok(()) => info!(topic = %topic, "Message moved to dead-letter topic"),
            Err(e) => error!(topic = %topic, "Failed to dead-letter message: {}", e),
        }
    }

    if let Err(e) = delivery.reject(false).await {
        error!("Failed to reject message: {}", e);
    }
    Handled::Dropped(reason)
}
