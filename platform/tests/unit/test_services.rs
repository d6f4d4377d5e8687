//! Deployment service tests

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use hangar::errors::PlatformError;
use hangar::models::deployment::DeploymentStatus;
use hangar::queue::{Delivery, MemoryQueue, Queue, QueueError};
use hangar::services::deployments::DeploymentService;
use hangar::store::DeploymentStore;

use crate::support::RecordingStore;

struct UnreachableQueue;

#[async_trait]
impl Queue for UnreachableQueue {
    async fn publish(&self, topic: &str, _body: Vec<u8>) -> Result<(), QueueError> {
        Err(QueueError::Publish {
            topic: topic.to_string(),
            reason: "broker unreachable".to_string(),
        })
    }

    async fn consume(&self, topic: &str) -> Result<BoxStream<'static, Delivery>, QueueError> {
        Err(QueueError::Consume {
            topic: topic.to_string(),
            reason: "broker unreachable".to_string(),
        })
    }
}

#[tokio::test]
async fn test_publish_failure_marks_record_failed() {
    let store = Arc::new(RecordingStore::default());
    let service = DeploymentService::new(
        store.clone(),
        Arc::new(UnreachableQueue),
        "deployments",
        "localhost",
    );

    let err = service
        .create("alice", "https://github.com/alice/site")
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::QueueError(_)));

    let records = store.list_by_owner("alice").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeploymentStatus::Failed);
    assert!(records[0].error_message.contains("broker unreachable"));
}

#[tokio::test]
async fn test_id_collision_is_retried() {
    let store = Arc::new(RecordingStore::with_conflicts(2));
    let queue = Arc::new(MemoryQueue::new());
    let service = DeploymentService::new(store.clone(), queue.clone(), "deployments", "localhost");

    let deployment = service
        .create("alice", "https://github.com/alice/site")
        .await
        .unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Pending);
    assert!(store.get(&deployment.deploy_id).await.unwrap().is_some());
    assert_eq!(queue.stats("deployments").published, 1);
}

#[tokio::test]
async fn test_id_allocation_gives_up() {
    let store = Arc::new(RecordingStore::with_conflicts(3));
    let queue = Arc::new(MemoryQueue::new());
    let service = DeploymentService::new(store.clone(), queue.clone(), "deployments", "localhost");

    let err = service
        .create("alice", "https://github.com/alice/site")
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Internal(_)));
    assert!(store.inner.is_empty());
    assert_eq!(queue.stats("deployments").published, 0);
}

#[tokio::test]
async fn test_status_and_delete() {
    let store = Arc::new(RecordingStore::default());
    let service = DeploymentService::new(
        store.clone(),
        Arc::new(MemoryQueue::new()),
        "deployments",
        "localhost",
    );
    let deployment = service
        .create("alice", "https://github.com/alice/site")
        .await
        .unwrap();

    let found = service.status(&deployment.deploy_id).await.unwrap();
    assert_eq!(found.source_repo_url, "https://github.com/alice/site");

    assert!(matches!(
        service.delete(&deployment.deploy_id, "bob").await,
        Err(PlatformError::NotFound(_))
    ));
    service.delete(&deployment.deploy_id, "alice").await.unwrap();
    assert!(matches!(
        service.status(&deployment.deploy_id).await,
        Err(PlatformError::NotFound(_))
    ));

    // Soft delete keeps the record
    assert!(store.inner.get_any(&deployment.deploy_id).unwrap().is_deleted());
}
