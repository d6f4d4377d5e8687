//! Deployment pipeline: clone, upload source, build, upload dist

pub mod executor;
pub mod fsm;
pub mod git;
pub mod pipeline;

use thiserror::Error;

use crate::store::StoreError;

pub use pipeline::{Outcome, Pipeline};

/// A stage failure, recorded as the deployment's error message
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Clone failed: {0}")]
    Clone(String),

    #[error("Upload failed: {0}")]
    SourceUpload(String),

    #[error("Build failed: {0}")]
    Build(String),

    #[error("Dist upload failed: {0}")]
    DistUpload(String),

    #[error("Status update failed: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Transition(String),
}
