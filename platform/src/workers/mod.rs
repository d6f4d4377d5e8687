//! Long-running background workers

pub mod deployer;
