//! Build executor
//!
//! Runs the install command then the build command in a working directory.
//! Standard output is read in chunks; each chunk goes to the log hub as soon
//! as it is read and is also kept for the combined log.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::hub::LogHub;
use crate::storage::settings::BuildSettings;

/// Read size for child output
const CHUNK_SIZE: usize = 1024;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("no {0} command configured")]
    EmptyCommand(&'static str),

    #[error("failed to start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` {status}")]
    Exit { command: String, status: String },

    #[error("failed waiting for `{command}`: {reason}")]
    Wait { command: String, reason: String },
}

/// Combined log plus the first error, if any
#[derive(Debug)]
pub struct BuildOutput {
    pub log: String,
    pub error: Option<ExecutorError>,
}

impl BuildOutput {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Fixed two-step build
#[derive(Clone)]
pub struct BuildExecutor {
    install_cmd: Vec<String>,
    build_cmd: Vec<String>,
    output_dir: String,
    hub: LogHub,
}

impl BuildExecutor {
    pub fn new(settings: &BuildSettings, hub: LogHub) -> Self {
        Self {
            install_cmd: settings.install_cmd.clone(),
            build_cmd: settings.build_cmd.clone(),
            output_dir: settings.output_dir.clone(),
            hub,
        }
    }

    /// Directory the build writes its publishable output to
    pub fn output_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.output_dir)
    }

    /// Install, then build if install succeeded.
    ///
    /// The log holds install output, or install and build output joined by a
    /// newline.
    pub async fn run(&self, working_dir: &Path, deploy_id: &str) -> BuildOutput {
        self.hub.broadcast(deploy_id, "Installing dependencies...");
        let (install_log, result) = self
            .run_step("install", &self.install_cmd, working_dir, deploy_id)
            .await;

        if let Err(error) = result {
            return BuildOutput {
                log: install_log,
                error: Some(error),
            };
        }

        self.hub.broadcast(deploy_id, "Building project...");
        let (build_log, result) = self
            .run_step("build", &self.build_cmd, working_dir, deploy_id)
            .await;

        BuildOutput {
            log: format!("{}\n{}", install_log, build_log),
            error: result.err(),
        }
    }

    async fn run_step(
        &self,
        step: &'static str,
        argv: &[String],
        working_dir: &Path,
        deploy_id: &str,
    ) -> (String, Result<(), ExecutorError>) {
        let Some((program, args)) = argv.split_first() else {
            return (String::new(), Err(ExecutorError::EmptyCommand(step)));
        };
        let command = argv.join(" ");
        info!(deploy_id = %deploy_id, command = %command, "Running {} step", step);

        let mut child = match Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return (
                    String::new(),
                    Err(ExecutorError::Spawn {
                        command,
                        reason: e.to_string(),
                    }),
                )
            }
        };

        let mut output = Vec::new();
        if let Some(mut stdout) = child.stdout.take() {
            let mut buf = [0u8; CHUNK_SIZE];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        output.extend_from_slice(&buf[..n]);
                        self.hub.broadcast(deploy_id, Bytes::copy_from_slice(&buf[..n]));
                    }
                    Err(e) => {
                        warn!(deploy_id = %deploy_id, "Failed reading {} output: {}", step, e);
                        break;
                    }
                }
            }
        }

        let log = String::from_utf8_lossy(&output).into_owned();
        let result = match child.wait().await {
            Ok(status) if status.success() => {
                debug!(deploy_id = %deploy_id, bytes = output.len(), "{} step finished", step);
                Ok(())
            }
            Ok(status) => Err(ExecutorError::Exit {
                command,
                status: status.to_string(),
            }),
            Err(e) => Err(ExecutorError::Wait {
                command,
                reason: e.to_string(),
            }),
        };

        (log, result)
    }
}
