//! Application state management

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::app::options::AppOptions;
use crate::blob::{BlobStore, ObjectBlobStore};
use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::errors::PlatformError;
use crate::hub::LogHub;
use crate::queue::{MemoryQueue, Queue};
use crate::storage::settings::CacheBackend;
use crate::store::{DeploymentStore, MemoryStore};

/// Main application state
pub struct AppState {
    /// Deployment records
    pub store: Arc<dyn DeploymentStore>,

    /// Deployment queue
    pub queue: Arc<dyn Queue>,

    /// Sources and published artifacts
    pub blobs: Arc<dyn BlobStore>,

    /// Artifact router cache
    pub cache: Arc<dyn Cache>,

    /// Live build log fan-out
    pub hub: LogHub,
}

impl AppState {
    /// Initialize application state. The returned handles are its background
    /// tasks: the log hub and, with the memory cache, the expiry purge, which
    /// stops on `shutdown_rx`.
    pub async fn init(
        options: &AppOptions,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(Self, Vec<JoinHandle<()>>), PlatformError> {
        info!("Initializing application state...");

        let blobs: Arc<dyn BlobStore> = Arc::new(ObjectBlobStore::from_settings(&options.blob)?);

        let mut tasks = Vec::new();
        let cache: Arc<dyn Cache> = match options.cache.backend {
            CacheBackend::Memory => {
                let cache = Arc::new(MemoryCache::new());
                let every = Duration::from_secs(options.cache.purge_interval_secs.max(1));
                tasks.push(cache.clone().spawn_purge(every, async move {
                    let _ = shutdown_rx.recv().await;
                }));
                cache
            }
            CacheBackend::Redis => Arc::new(
                RedisCache::connect(&options.cache.url, options.cache.pool_size).await?,
            ),
        };

        options.layout.setup().await?;

        let (hub, hub_handle) = LogHub::spawn();
        tasks.push(hub_handle);

        let state = Self {
            store: Arc::new(MemoryStore::new()),
            queue: Arc::new(MemoryQueue::new()),
            blobs,
            cache,
            hub,
        };

        Ok((state, tasks))
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), PlatformError> {
        info!("Shutting down application state...");
        self.hub.shutdown();
        Ok(())
    }
}
