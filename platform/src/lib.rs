//! Hangar Library
//!
//! Deployment orchestrator, live log hub and artifact router for a minimal
//! static-site platform.

pub mod app;
pub mod blob;
pub mod cache;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod hub;
pub mod logs;
pub mod models;
pub mod queue;
pub mod router;
pub mod server;
pub mod services;
pub mod storage;
pub mod store;
pub mod utils;
pub mod workers;
