//! Hangar API models
//!
//! Request and response bodies exchanged with the submission API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Submit a repository for deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub repo_url: String,
}

/// Response to a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub id: String,
    pub status: String,
    pub deployed_url: String,
}

/// A deployment as reported by the status and listing endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentView {
    pub deploy_id: String,
    pub owner_id: String,
    pub repo_url: String,
    pub status: String,
    pub deployed_url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_log: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_msg: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Plain acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}
