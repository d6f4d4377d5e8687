//! Settings file management

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use tracing::info;

use crate::errors::PlatformError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Default settings location
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/hangar/settings.json";

/// Environment variable overriding the settings location
pub const SETTINGS_ENV: &str = "HANGAR_CONFIG";

/// Platform settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub log: LogSettings,

    /// Domain published sites live under, as `{deploy_id}.{base_domain}`
    #[serde(default = "default_base_domain")]
    pub base_domain: String,

    /// Submission and status API listener
    #[serde(default)]
    pub api: ApiSettings,

    /// Artifact router listener
    #[serde(default)]
    pub router: RouterSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub build: BuildSettings,

    /// Parent of the per-deployment working directories
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    #[serde(default)]
    pub blob: BlobSettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

fn default_base_domain() -> String {
    "localhost".to_string()
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("hangar")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log: LogSettings::default(),
            base_domain: default_base_domain(),
            api: ApiSettings::default(),
            router: RouterSettings::default(),
            queue: QueueSettings::default(),
            build: BuildSettings::default(),
            work_root: default_work_root(),
            blob: BlobSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self, PlatformError> {
        let file = File::new(path);
        if !file.exists().await {
            info!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let settings: Settings = file.read_json().await.map_err(|e| {
            PlatformError::ConfigError(format!("invalid settings file {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Settings loaded");
        Ok(settings)
    }
}

/// Where to look for the settings file: the explicit path, then
/// `HANGAR_CONFIG`, then the default location
pub fn settings_path(explicit: Option<&str>) -> PathBuf {
    explicit
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(SETTINGS_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH))
}

/// Log output settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSettings {
    /// Emit JSON lines instead of human-readable text
    #[serde(default)]
    pub json: bool,

    /// Also write daily-rotated log files here
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// API listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_api_port(),
        }
    }
}

/// Artifact router settings
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_router_port")]
    pub port: u16,

    /// TTL of cached artifacts in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_router_port() -> u16 {
    3001
}

fn default_cache_ttl() -> u64 {
    600
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_router_port(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

/// Deployment queue settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Unrecoverable messages are copied here before being dropped
    #[serde(default)]
    pub dead_letter_topic: Option<String>,
}

fn default_topic() -> String {
    "deployments".to_string()
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            dead_letter_topic: None,
        }
    }
}

/// Build commands, each an argv vector run in the working directory
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSettings {
    #[serde(default = "default_install_cmd")]
    pub install_cmd: Vec<String>,

    #[serde(default = "default_build_cmd")]
    pub build_cmd: Vec<String>,

    /// Build output directory, relative to the working directory
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_install_cmd() -> Vec<String> {
    vec!["npm".to_string(), "install".to_string()]
}

fn default_build_cmd() -> Vec<String> {
    vec!["npm".to_string(), "run".to_string(), "build".to_string()]
}

fn default_output_dir() -> String {
    "dist".to_string()
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            install_cmd: default_install_cmd(),
            build_cmd: default_build_cmd(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    #[default]
    Memory,
    Local,
    S3,
}

/// Object storage settings
#[derive(Debug, Clone, Deserialize)]
pub struct BlobSettings {
    #[serde(default)]
    pub backend: BlobBackend,

    /// Root directory for the local backend
    #[serde(default = "default_blob_path")]
    pub path: PathBuf,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Custom endpoint for S3-compatible services
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default)]
    pub secret_key: Option<SecretString>,
}

fn default_blob_path() -> PathBuf {
    PathBuf::from("/var/lib/hangar/blobs")
}

fn default_bucket() -> String {
    "hangar".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for BlobSettings {
    fn default() -> Self {
        Self {
            backend: BlobBackend::default(),
            path: default_blob_path(),
            bucket: default_bucket(),
            endpoint: None,
            region: default_region(),
            access_key: None,
            secret_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

/// Artifact cache settings
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: CacheBackend,

    #[serde(default = "default_cache_url")]
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How often the memory backend sweeps expired entries
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

fn default_cache_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_pool_size() -> usize {
    8
}

fn default_purge_interval_secs() -> u64 {
    60
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            url: default_cache_url(),
            pool_size: default_pool_size(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}
