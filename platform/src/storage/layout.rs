//! Working directory layout

use std::path::PathBuf;

use crate::errors::PlatformError;
use crate::filesys::dir::Dir;

/// Where the orchestrator checks out and builds deployments
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Parent of every per-deployment working directory
    pub work_root: PathBuf,
}

impl StorageLayout {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
        }
    }

    /// Working directory for one deployment. A deterministic function of the
    /// id, so a redelivered message reuses (and overwrites) the same place.
    pub fn working_dir(&self, deploy_id: &str) -> Dir {
        Dir::new(self.work_root.join(deploy_id))
    }

    /// Create the work root
    pub async fn setup(&self) -> Result<(), PlatformError> {
        Dir::new(&self.work_root).create().await
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("hangar"))
    }
}
