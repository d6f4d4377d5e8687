//! Deployer worker tests

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::oneshot;

use hangar::blob::ObjectBlobStore;
use hangar::deploy::executor::BuildExecutor;
use hangar::deploy::git::SourceFetcher;
use hangar::deploy::{Outcome, Pipeline};
use hangar::hub::LogHub;
use hangar::models::deployment::{Deployment, DeploymentStatus, QueueMessage};
use hangar::queue::{Delivery, MemoryQueue, Queue};
use hangar::storage::layout::StorageLayout;
use hangar::storage::settings::BuildSettings;
use hangar::store::{DeploymentStore, MemoryStore};
use hangar::workers::deployer::{self, Handled, Options};

use crate::support::{eventually, FakeFetcher, GatedFetcher};

const TOPIC: &str = "deployments";

struct Setup {
    queue: Arc<MemoryQueue>,
    store: Arc<MemoryStore>,
    pipeline: Arc<Pipeline>,
    _work_root: tempfile::TempDir,
}

fn setup(fetcher: Arc<dyn SourceFetcher>) -> Setup {
    let work_root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let (hub, _) = LogHub::spawn();

    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(ObjectBlobStore::in_memory()),
        fetcher,
        BuildExecutor::new(&BuildSettings::default(), hub.clone()),
        StorageLayout::new(work_root.path()),
        hub,
    );

    Setup {
        queue: Arc::new(MemoryQueue::new()),
        store,
        pipeline: Arc::new(pipeline),
        _work_root: work_root,
    }
}

fn options(dead_letter_topic: Option<&str>) -> Options {
    Options {
        topic: TOPIC.to_string(),
        dead_letter_topic: dead_letter_topic.map(str::to_string),
        retry_delay: Duration::from_millis(10),
    }
}

async fn enqueue(s: &Setup, deploy_id: &str) {
    let deployment = Deployment::new(deploy_id, "alice", "https://github.com/alice/site", "localhost");
    s.store.create(&deployment).await.unwrap();
    let body = QueueMessage {
        deploy_id: deploy_id.to_string(),
        repo_url: deployment.source_repo_url.clone(),
    }
    .encode()
    .unwrap();
    s.queue.publish(TOPIC, body).await.unwrap();
}

async fn next_delivery(queue: &MemoryQueue) -> Delivery {
    let mut deliveries = queue.consume(TOPIC).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), deliveries.next())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_undecodable_message_is_dead_lettered() {
    let s = setup(Arc::new(FakeFetcher::failing("unused")));
    s.queue.publish(TOPIC, b"not json".to_vec()).await.unwrap();

    let delivery = next_delivery(&s.queue).await;
    let handled = deployer::handle_delivery(
        &options(Some("dead")),
        s.queue.as_ref(),
        s.store.as_ref(),
        &s.pipeline,
        delivery,
    )
    .await;

    assert!(matches!(handled, Handled::Dropped(ref r) if r.starts_with("undecodable message")));

    let stats = s.queue.stats(TOPIC);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.requeued, 0);
    assert_eq!(stats.acked, 0);

    let mut dead = s.queue.consume("dead").await.unwrap();
    let dead_letter = dead.next().await.unwrap();
    assert_eq!(dead_letter.body(), b"not json");
}

#[tokio::test]
async fn test_message_for_missing_record_is_dropped() {
    let s = setup(Arc::new(FakeFetcher::failing("unused")));
    let body = QueueMessage {
        deploy_id: "ghost001".to_string(),
        repo_url: "https://github.com/alice/site".to_string(),
    }
    .encode()
    .unwrap();
    s.queue.publish(TOPIC, body).await.unwrap();

    let delivery = next_delivery(&s.queue).await;
    let handled = deployer::handle_delivery(
        &options(None),
        s.queue.as_ref(),
        s.store.as_ref(),
        &s.pipeline,
        delivery,
    )
    .await;

    assert_eq!(handled, Handled::Dropped("deployment ghost001 not found".to_string()));
    assert_eq!(s.queue.stats(TOPIC).rejected, 1);
    assert_eq!(s.queue.stats(TOPIC).requeued, 0);
}

#[tokio::test]
async fn test_failed_pipeline_is_acked() {
    let s = setup(Arc::new(FakeFetcher::failing("no such repo")));
    enqueue(&s, "fail0001").await;

    let delivery = next_delivery(&s.queue).await;
    let handled = deployer::handle_delivery(
        &options(None),
        s.queue.as_ref(),
        s.store.as_ref(),
        &s.pipeline,
        delivery,
    )
    .await;

    assert_eq!(
        handled,
        Handled::Acked(Outcome::Failed("Clone failed: no such repo".to_string()))
    );
    assert_eq!(s.queue.stats(TOPIC).acked, 1);

    let record = s.store.get("fail0001").await.unwrap().unwrap();
    assert_eq!(record.status, DeploymentStatus::Failed);
}

#[tokio::test]
async fn test_run_processes_until_shutdown() {
    let s = setup(Arc::new(FakeFetcher::failing("no such repo")));
    enqueue(&s, "loop0001").await;
    enqueue(&s, "loop0002").await;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let worker = tokio::spawn({
        let queue: Arc<dyn Queue> = s.queue.clone();
        let store: Arc<dyn DeploymentStore> = s.store.clone();
        let pipeline = s.pipeline.clone();
        async move {
            deployer::run(
                &options(None),
                queue,
                store,
                pipeline,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.await;
                }),
            )
            .await;
        }
    });

    let queue = s.queue.clone();
    assert!(eventually(|| {
        let queue = queue.clone();
        async move { queue.stats(TOPIC).acked == 2 }
    })
    .await);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .unwrap()
        .unwrap();

    for id in ["loop0001", "loop0002"] {
        let record = s.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, DeploymentStatus::Failed);
    }
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_message() {
    let fetcher = Arc::new(GatedFetcher::new());
    let s = setup(fetcher.clone());
    enqueue(&s, "drain001").await;
    enqueue(&s, "drain002").await;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let worker = tokio::spawn({
        let queue: Arc<dyn Queue> = s.queue.clone();
        let store: Arc<dyn DeploymentStore> = s.store.clone();
        let pipeline = s.pipeline.clone();
        async move {
            deployer::run(
                &options(None),
                queue,
                store,
                pipeline,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.await;
                }),
            )
            .await;
        }
    });

    // Signal shutdown while the first deployment is still cloning
    fetcher.started.notified().await;
    shutdown_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!worker.is_finished());

    fetcher.release.notify_one();
    tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .unwrap()
        .unwrap();

    let stats = s.queue.stats(TOPIC);
    assert_eq!(stats.acked, 1);

    let first = s.store.get("drain001").await.unwrap().unwrap();
    assert_eq!(first.status, DeploymentStatus::Failed);
    assert_eq!(first.error_message, "Clone failed: released");

    let second = s.store.get("drain002").await.unwrap().unwrap();
    assert_eq!(second.status, DeploymentStatus::Pending);
}
