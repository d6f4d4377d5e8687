//! Utility functions

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Alphabet for deployment ids, safe as a DNS label
const DEPLOY_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated deployment ids
pub const DEPLOY_ID_LEN: usize = 8;

/// Version information for the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Generate a random lowercase alphanumeric id of `len` characters
pub fn generate_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| DEPLOY_ID_CHARSET[rng.gen_range(0..DEPLOY_ID_CHARSET.len())] as char)
        .collect()
}

/// Generate a deployment id
pub fn generate_deploy_id() -> String {
    generate_id(DEPLOY_ID_LEN)
}
