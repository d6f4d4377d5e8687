//! Server state

use std::sync::Arc;

use crate::hub::LogHub;
use crate::services::deployments::DeploymentService;

/// Server state shared across handlers
pub struct ServerState {
    pub deployments: Arc<DeploymentService>,
    pub hub: LogHub,
}

impl ServerState {
    pub fn new(deployments: Arc<DeploymentService>, hub: LogHub) -> Self {
        Self { deployments, hub }
    }
}
