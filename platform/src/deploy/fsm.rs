//! Finite State Machine for a deployment's pipeline

use crate::models::deployment::DeploymentStatus;

/// Pipeline event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// Begin (or restart) processing, enters cloning
    Start,

    /// Source cloned into the working directory
    Cloned,

    /// Source uploaded under `source/{id}/`
    SourceUploaded,

    /// Install and build commands succeeded
    Built,

    /// Build output uploaded under `dist/{id}/`
    DistUploaded,

    /// A stage failed
    Fail(String),
}

/// Deployment FSM
///
/// `Deployed` and `Failed` are terminal and reject every event.
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self::from_status(DeploymentStatus::Pending)
    }

    /// Resume from a persisted status
    pub fn from_status(state: DeploymentStatus) -> Self {
        Self { state, error: None }
    }

    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    /// Failure reason, set only in `Failed`
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, String> {
        use DeploymentStatus::*;

        let new_state = match (self.state, &event) {
            // A redelivered message restarts an interrupted attempt from the top
            (Pending | Cloning | UploadingSource | Building | UploadingDist, DeploymentEvent::Start) => {
                self.error = None;
                Cloning
            }

            (Cloning, DeploymentEvent::Cloned) => UploadingSource,
            (UploadingSource, DeploymentEvent::SourceUploaded) => Building,
            (Building, DeploymentEvent::Built) => UploadingDist,
            (UploadingDist, DeploymentEvent::DistUploaded) => Deployed,

            (Cloning | UploadingSource | Building | UploadingDist, DeploymentEvent::Fail(err)) => {
                let err = if err.trim().is_empty() {
                    "deployment failed".to_string()
                } else {
                    err.clone()
                };
                self.error = Some(err);
                Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
