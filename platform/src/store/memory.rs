//! In-memory deployment store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::deployment::Deployment;

use super::{DeploymentStore, StoreError};

/// In-memory deployment store.
///
/// Records are lost when the process exits; suited to single-process runs
/// and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    deployments: RwLock<HashMap<String, Deployment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record including soft-deleted ones
    pub fn get_any(&self, deploy_id: &str) -> Option<Deployment> {
        self.deployments
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(deploy_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.deployments
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn create(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let mut deployments = self.deployments.write().map_err(|_| poisoned())?;

        if deployments.contains_key(&deployment.deploy_id) {
            return Err(StoreError::Conflict(deployment.deploy_id.clone()));
        }

        deployments.insert(deployment.deploy_id.clone(), deployment.clone());
        Ok(())
    }

    async fn get(&self, deploy_id: &str) -> Result<Option<Deployment>, StoreError> {
        let deployments = self.deployments.read().map_err(|_| poisoned())?;
        Ok(deployments
            .get(deploy_id)
            .filter(|d| !d.is_deleted())
            .cloned())
    }

    async fn save(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let mut deployments = self.deployments.write().map_err(|_| poisoned())?;

        let existing = deployments
            .get_mut(&deployment.deploy_id)
            .ok_or_else(|| StoreError::NotFound(deployment.deploy_id.clone()))?;

        // An in-flight pipeline saving a stale copy must not undo a delete
        let deleted_at = existing.deleted_at.or(deployment.deleted_at);
        *existing = deployment.clone();
        existing.deleted_at = deleted_at;
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Deployment>, StoreError> {
        let deployments = self.deployments.read().map_err(|_| poisoned())?;

        let mut owned: Vec<Deployment> = deployments
            .values()
            .filter(|d| d.owner_id == owner_id && !d.is_deleted())
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn delete(&self, deploy_id: &str, owner_id: &str) -> Result<u64, StoreError> {
        let mut deployments = self.deployments.write().map_err(|_| poisoned())?;

        match deployments.get_mut(deploy_id) {
            Some(d) if d.owner_id == owner_id && !d.is_deleted() => {
                d.deleted_at = Some(Utc::now());
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}
