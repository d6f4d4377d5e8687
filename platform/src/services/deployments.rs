//! Deployment submission and queries

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use url::Url;

use crate::errors::PlatformError;
use crate::models::deployment::{Deployment, DeploymentStatus, QueueMessage};
use crate::queue::Queue;
use crate::store::{DeploymentStore, StoreError};
use crate::utils::generate_deploy_id;

/// Attempts at finding an unused deploy id
const ID_ATTEMPTS: usize = 3;

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "git", "ssh"];

/// Check that `repo_url` is something `git clone` can fetch
pub fn validate_repo_url(repo_url: &str) -> Result<Url, PlatformError> {
    let trimmed = repo_url.trim();
    if trimmed.is_empty() {
        return Err(PlatformError::ValidationError("repo_url is required".to_string()));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| PlatformError::ValidationError(format!("invalid repo_url: {}", e)))?;

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(PlatformError::ValidationError(format!(
            "unsupported repo_url scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(PlatformError::ValidationError("repo_url must have a host".to_string()));
    }

    Ok(url)
}

pub struct DeploymentService {
    store: Arc<dyn DeploymentStore>,
    queue: Arc<dyn Queue>,
    topic: String,
    base_domain: String,
}

impl DeploymentService {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        queue: Arc<dyn Queue>,
        topic: impl Into<String>,
        base_domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue,
            topic: topic.into(),
            base_domain: base_domain.into(),
        }
    }

    /// Record a pending deployment and enqueue it for the orchestrator.
    ///
    /// If the message cannot be published the record is marked failed and
    /// the publish error is returned.
    pub async fn create(&self, owner_id: &str, repo_url: &str) -> Result<Deployment, PlatformError> {
        let repo_url = validate_repo_url(repo_url)?.to_string();
        let mut deployment = self.insert_pending(owner_id, &repo_url).await?;

        let message = QueueMessage {
            deploy_id: deployment.deploy_id.clone(),
            repo_url: repo_url.clone(),
        };

        let published = match message.encode() {
            Ok(body) => self.queue.publish(&self.topic, body).await.map_err(PlatformError::from),
            Err(e) => Err(PlatformError::from(e)),
        };

        if let Err(e) = published {
            error!(deploy_id = %deployment.deploy_id, "Failed to enqueue deployment: {}", e);
            deployment.status = DeploymentStatus::Failed;
            deployment.error_message = e.to_string();
            deployment.updated_at = Utc::now();
            if let Err(save_err) = self.store.save(&deployment).await {
                warn!(deploy_id = %deployment.deploy_id, "Failed to mark deployment failed: {}", save_err);
            }
            return Err(e);
        }

        info!(deploy_id = %deployment.deploy_id, owner_id = %owner_id, repo_url = %repo_url, "Deployment queued");
        Ok(deployment)
    }

    async fn insert_pending(&self, owner_id: &str, repo_url: &str) -> Result<Deployment, PlatformError> {
        for _ in 0..ID_ATTEMPTS {
            let deployment = Deployment::new(&generate_deploy_id(), owner_id, repo_url, &self.base_domain);
            match self.store.create(&deployment).await {
                Ok(()) => return Ok(deployment),
                Err(StoreError::Conflict(id)) => {
                    warn!(deploy_id = %id, "Deploy id collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PlatformError::Internal(
            "could not allocate a unique deploy id".to_string(),
        ))
    }

    pub async fn status(&self, deploy_id: &str) -> Result<Deployment, PlatformError> {
        self.store
            .get(deploy_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("deployment {} not found", deploy_id)))
    }

    /// Deployments of `owner_id`, newest first
    pub async fn list(&self, owner_id: &str) -> Result<Vec<Deployment>, PlatformError> {
        Ok(self.store.list_by_owner(owner_id).await?)
    }

    /// Soft delete. Does not interrupt a build already in progress.
    pub async fn delete(&self, deploy_id: &str, owner_id: &str) -> Result<(), PlatformError> {
        let affected = self.store.delete(deploy_id, owner_id).await?;
        if affected == 0 {
            return Err(PlatformError::NotFound(
                "deployment not found or unauthorized".to_string(),
            ));
        }
        info!(deploy_id = %deploy_id, owner_id = %owner_id, "Deployment deleted");
        Ok(())
    }
}
