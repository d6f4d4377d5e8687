//! Drives one deployment record to a terminal state
//!
//! Status is persisted before every stage starts, so a status query always
//! sees the stage in progress. Every effect is keyed by the deploy id
//! (working directory, blob prefixes), so re-running a message overwrites
//! rather than appends.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::blob::BlobStore;
use crate::deploy::executor::BuildExecutor;
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::git::SourceFetcher;
use crate::deploy::DeployError;
use crate::filesys::dir::Dir;
use crate::hub::LogHub;
use crate::models::deployment::{Deployment, DeploymentStatus};
use crate::storage::layout::StorageLayout;
use crate::store::DeploymentStore;

/// Result of processing one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Deployed,

    /// Failed with the recorded error message
    Failed(String),

    /// Record was already terminal; nothing was run
    Skipped(DeploymentStatus),
}

pub struct Pipeline {
    store: Arc<dyn DeploymentStore>,
    blobs: Arc<dyn BlobStore>,
    fetcher: Arc<dyn SourceFetcher>,
    executor: BuildExecutor,
    layout: StorageLayout,
    hub: LogHub,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        blobs: Arc<dyn BlobStore>,
        fetcher: Arc<dyn SourceFetcher>,
        executor: BuildExecutor,
        layout: StorageLayout,
        hub: LogHub,
    ) -> Self {
        Self {
            store,
            blobs,
            fetcher,
            executor,
            layout,
            hub,
        }
    }

    /// Run every stage for `deployment`. Never returns an error: stage
    /// failures are recorded on the deployment.
    pub async fn process(&self, mut deployment: Deployment) -> Outcome {
        if deployment.status.is_terminal() {
            info!(
                deploy_id = %deployment.deploy_id,
                status = %deployment.status,
                "Deployment already finished, skipping"
            );
            return Outcome::Skipped(deployment.status);
        }

        let mut fsm = DeploymentFsm::from_status(deployment.status);
        let working_dir = self.layout.working_dir(&deployment.deploy_id);

        match self.run_stages(&mut deployment, &mut fsm, &working_dir).await {
            Ok(()) => {
                info!(deploy_id = %deployment.deploy_id, url = %deployment.published_url, "Deployment completed");
                Outcome::Deployed
            }
            Err(err) => {
                let message = err.to_string();
                warn!(deploy_id = %deployment.deploy_id, "Deployment failed: {}", message);
                self.fail(&mut deployment, &mut fsm, &working_dir, &message).await;
                Outcome::Failed(deployment.error_message)
            }
        }
    }

    async fn run_stages(
        &self,
        deployment: &mut Deployment,
        fsm: &mut DeploymentFsm,
        working_dir: &Dir,
    ) -> Result<(), DeployError> {
        let deploy_id = deployment.deploy_id.clone();

        // Clone
        deployment.build_log.clear();
        self.advance(deployment, fsm, DeploymentEvent::Start).await?;
        working_dir
            .delete()
            .await
            .map_err(|e| DeployError::Clone(e.to_string()))?;
        self.fetcher
            .fetch(&deployment.source_repo_url, working_dir.path())
            .await
            .map_err(DeployError::Clone)?;

        // Upload source
        self.advance(deployment, fsm, DeploymentEvent::Cloned).await?;
        self.upload(working_dir.path(), &deployment.source_prefix())
            .await
            .map_err(|e| DeployError::SourceUpload(e.to_string()))?;

        // Build
        self.advance(deployment, fsm, DeploymentEvent::SourceUploaded).await?;
        self.hub.broadcast(&deploy_id, "Starting build process...");
        let output = self.executor.run(working_dir.path(), &deploy_id).await;
        deployment.build_log = output.log;
        if let Some(err) = output.error {
            return Err(DeployError::Build(err.to_string()));
        }

        // Upload dist
        self.advance(deployment, fsm, DeploymentEvent::Built).await?;
        self.upload(&self.executor.output_dir(working_dir.path()), &deployment.dist_prefix())
            .await
            .map_err(|e| DeployError::DistUpload(e.to_string()))?;

        remove_working_dir(working_dir, &deploy_id).await;

        self.advance(deployment, fsm, DeploymentEvent::DistUploaded).await?;
        Ok(())
    }

    /// Apply `event` and persist the new status
    async fn advance(
        &self,
        deployment: &mut Deployment,
        fsm: &mut DeploymentFsm,
        event: DeploymentEvent,
    ) -> Result<(), DeployError> {
        let status = fsm.process(event).map_err(DeployError::Transition)?;
        deployment.status = status;
        deployment.error_message = fsm.error().unwrap_or_default().to_string();
        deployment.updated_at = Utc::now();
        self.store.save(deployment).await?;

        info!(deploy_id = %deployment.deploy_id, status = %status, "Deployment status updated");
        Ok(())
    }

    /// Replace everything under `prefix` with the contents of `local`
    async fn upload(&self, local: &Path, prefix: &str) -> Result<usize, crate::blob::BlobError> {
        self.blobs.delete_prefix(prefix).await?;
        self.blobs.put_directory(local, prefix).await
    }

    async fn fail(
        &self,
        deployment: &mut Deployment,
        fsm: &mut DeploymentFsm,
        working_dir: &Dir,
        message: &str,
    ) {
        let deploy_id = deployment.deploy_id.clone();

        // No partial site may stay published
        if let Err(e) = self.blobs.delete_prefix(&deployment.dist_prefix()).await {
            warn!(deploy_id = %deploy_id, "Failed to clear dist artifacts: {}", e);
        }
        remove_working_dir(working_dir, &deploy_id).await;

        if let Err(e) = fsm.process(DeploymentEvent::Fail(message.to_string())) {
            error!(deploy_id = %deploy_id, "{}", e);
        }
        deployment.status = DeploymentStatus::Failed;
        deployment.error_message = fsm.error().unwrap_or(message).to_string();
        deployment.updated_at = Utc::now();

        if let Err(e) = self.store.save(deployment).await {
            error!(deploy_id = %deploy_id, "Failed to record deployment failure: {}", e);
        }
    }
}

async fn remove_working_dir(working_dir: &Dir, deploy_id: &str) {
    if let Err(e) = working_dir.delete().await {
        warn!(deploy_id = %deploy_id, path = %working_dir.path().display(), "Failed to remove working directory: {}", e);
    }
}
