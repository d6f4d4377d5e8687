//! Application configuration options

use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::{BlobSettings, BuildSettings, CacheSettings, Settings};
use crate::workers::deployer;

/// Which components this process runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// API, orchestrator and artifact router
    #[default]
    All,

    /// API and orchestrator
    Api,

    /// Artifact router only
    Router,
}

impl RunMode {
    pub fn runs_api(&self) -> bool {
        matches!(self, RunMode::All | RunMode::Api)
    }

    pub fn runs_router(&self) -> bool {
        matches!(self, RunMode::All | RunMode::Router)
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(RunMode::All),
            "api" => Ok(RunMode::Api),
            "router" => Ok(RunMode::Router),
            _ => Err(format!("Invalid mode: {} (expected all, api or router)", s)),
        }
    }
}

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    pub mode: RunMode,

    /// Domain published sites live under
    pub base_domain: String,

    /// Submission API server
    pub api_server: ServerOptions,

    /// Artifact router server
    pub router_server: ServerOptions,

    /// TTL of artifacts cached by the router
    pub cache_ttl: Duration,

    /// Working directory layout
    pub layout: StorageLayout,

    pub build: BuildSettings,

    pub blob: BlobSettings,

    pub cache: CacheSettings,

    /// Deployer worker options
    pub deployer: deployer::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), RunMode::default())
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings, mode: RunMode) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            mode,
            base_domain: settings.base_domain.clone(),
            api_server: ServerOptions {
                host: settings.api.host.clone(),
                port: settings.api.port,
            },
            router_server: ServerOptions {
                host: settings.router.host.clone(),
                port: settings.router.port,
            },
            cache_ttl: Duration::from_secs(settings.router.cache_ttl_secs),
            layout: StorageLayout::new(&settings.work_root),
            build: settings.build.clone(),
            blob: settings.blob.clone(),
            cache: settings.cache.clone(),
            deployer: deployer::Options {
                topic: settings.queue.topic.clone(),
                dead_letter_topic: settings.queue.dead_letter_topic.clone(),
                ..Default::default()
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown, including the in-flight build
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(300),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
