//! Deployment models

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployment status as persisted and reported
///
/// Declaration order is pipeline order: within one processing attempt a
/// deployment only ever moves to a later variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Submitted and queued, not yet picked up
    Pending,

    /// Source repository is being cloned
    Cloning,

    /// Cloned source is being uploaded under `source/{id}/`
    #[serde(rename = "uploading")]
    UploadingSource,

    /// Install and build commands are running
    Building,

    /// Build output is being uploaded under `dist/{id}/`
    UploadingDist,

    /// Published
    Deployed,

    /// A stage failed, see `error_message`
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Cloning => "cloning",
            DeploymentStatus::UploadingSource => "uploading",
            DeploymentStatus::Building => "building",
            DeploymentStatus::UploadingDist => "uploading_dist",
            DeploymentStatus::Deployed => "deployed",
            DeploymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Deployed | DeploymentStatus::Failed)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One build-and-publish attempt for a source repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// Short random id, also the subdomain and blob key prefix
    pub deploy_id: String,

    pub owner_id: String,

    pub source_repo_url: String,

    pub status: DeploymentStatus,

    /// `http://{deploy_id}.{base_domain}`, set at creation
    pub published_url: String,

    /// Full build output, written once the build stage finishes
    #[serde(default)]
    pub build_log: String,

    /// Non-empty if and only if `status` is `Failed`
    #[serde(default)]
    pub error_message: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Create a pending deployment
    pub fn new(deploy_id: &str, owner_id: &str, repo_url: &str, base_domain: &str) -> Self {
        let now = Utc::now();
        Self {
            deploy_id: deploy_id.to_string(),
            owner_id: owner_id.to_string(),
            source_repo_url: repo_url.to_string(),
            status: DeploymentStatus::Pending,
            published_url: published_url(deploy_id, base_domain),
            build_log: String::new(),
            error_message: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Blob key prefix holding the cloned source
    pub fn source_prefix(&self) -> String {
        source_prefix(&self.deploy_id)
    }

    /// Blob key prefix holding the published build output
    pub fn dist_prefix(&self) -> String {
        dist_prefix(&self.deploy_id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl From<Deployment> for api_models::DeploymentView {
    fn from(d: Deployment) -> Self {
        Self {
            deploy_id: d.deploy_id,
            owner_id: d.owner_id,
            repo_url: d.source_repo_url,
            status: d.status.to_string(),
            deployed_url: d.published_url,
            build_log: d.build_log,
            error_msg: d.error_message,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

pub fn published_url(deploy_id: &str, base_domain: &str) -> String {
    format!("http://{}.{}", deploy_id, base_domain)
}

pub fn source_prefix(deploy_id: &str) -> String {
    format!("source/{}", deploy_id)
}

pub fn dist_prefix(deploy_id: &str) -> String {
    format!("dist/{}", deploy_id)
}

/// Work item published for the orchestrator
///
/// Only carries what is needed to re-hydrate the deployment from the store;
/// the stored record is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub deploy_id: String,
    pub repo_url: String,
}

impl QueueMessage {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// A slice of live build output for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub deploy_id: String,
    pub bytes: Bytes,
}
