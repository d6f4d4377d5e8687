//! Source checkout

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

/// Fetches a deployment's source tree into a local directory.
///
/// Trait for testability.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Populate `dest`, which does not exist yet
    async fn fetch(&self, repo_url: &str, dest: &Path) -> Result<(), String>;
}

/// Clones with the `git` command line
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: String,
}

impl GitFetcher {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    /// Use a specific git executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(&self, repo_url: &str, dest: &Path) -> Result<(), String> {
        info!(repo_url = %repo_url, dest = %dest.display(), "Cloning repository");

        let output = Command::new(&self.program)
            .arg("clone")
            .arg("--quiet")
            .arg("--")
            .arg(repo_url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("git clone {}: {}", output.status, stderr.trim()));
        }

        debug!(dest = %dest.display(), "Repository cloned");
        Ok(())
    }
}
