//! Durable deployment records

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::deployment::Deployment;

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("deployment {0} already exists")]
    Conflict(String),

    #[error("deployment {0} not found")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed deployment records with soft delete
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert a new record; fails with `Conflict` if the id is taken.
    async fn create(&self, deployment: &Deployment) -> Result<(), StoreError>;

    /// Point lookup by deploy id. Soft-deleted records are not returned.
    async fn get(&self, deploy_id: &str) -> Result<Option<Deployment>, StoreError>;

    /// Full-record update of an existing deployment.
    async fn save(&self, deployment: &Deployment) -> Result<(), StoreError>;

    /// Live records of one owner, newest first.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Deployment>, StoreError>;

    /// Soft delete scoped to its owner. Returns the number of rows affected.
    async fn delete(&self, deploy_id: &str, owner_id: &str) -> Result<u64, StoreError>;
}
