//! Artifact router: serves published sites by host and path
//!
//! Cache-aside over the blob store. A miss is served from the blob store and
//! written back to the cache in a detached task, so the response never waits
//! on the cache write.

pub mod serve;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::blob::{Blob, BlobError, BlobStore};
use crate::cache::{Cache, CacheError};
use crate::models::deployment::dist_prefix;

/// Suffix of the key holding a cached body's content type
pub const CONTENT_TYPE_SUFFIX: &str = ":content-type";

const INDEX_PATH: &str = "/index.html";

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid host: {0}")]
    BadHost(String),

    #[error("invalid path: {0}")]
    BadPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub cache: CacheStatus,
}

/// A resolved artifact plus the pending cache write, if one was started
#[derive(Debug)]
pub struct Resolved {
    pub artifact: Artifact,
    pub cache_fill: Option<JoinHandle<()>>,
}

/// Deployment id from the first label of `host`. Any port is ignored.
pub fn deploy_id_from_host(host: &str) -> Result<String, RouterError> {
    let hostname = host.split(':').next().unwrap_or_default().trim();
    let mut labels = hostname.split('.');
    let first = labels.next().unwrap_or_default();

    if first.is_empty() || labels.next().is_none() {
        return Err(RouterError::BadHost(host.to_string()));
    }
    Ok(first.to_ascii_lowercase())
}

/// Percent-decode a request path into the form blob keys are stored in
pub fn decode_path(raw: &str) -> Result<String, RouterError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|path| path.into_owned())
        .map_err(|_| RouterError::BadPath(raw.to_string()))
}

/// Empty and `/` mean the site index; every path starts with `/`
pub fn normalize_path(path: &str) -> String {
    match path {
        "" | "/" => INDEX_PATH.to_string(),
        p if p.starts_with('/') => p.to_string(),
        p => format!("/{}", p),
    }
}

pub fn cache_key(deploy_id: &str, path: &str) -> String {
    format!("deploy:{}:{}", deploy_id, path)
}

pub fn content_type_key(key: &str) -> String {
    format!("{}{}", key, CONTENT_TYPE_SUFFIX)
}

#[derive(Clone)]
pub struct ArtifactRouter {
    blobs: Arc<dyn BlobStore>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl ArtifactRouter {
    pub fn new(blobs: Arc<dyn BlobStore>, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { blobs, cache, ttl }
    }

    /// Resolve `host` + `path` to an artifact.
    ///
    /// On a cache hit the blob store is not touched. On a miss the literal
    /// key is fetched, then `index.html` as a single-page-app fallback, and
    /// the result is cached under the requested key.
    pub async fn resolve(&self, host: &str, path: &str) -> Result<Resolved, RouterError> {
        let deploy_id = deploy_id_from_host(host)?;
        let path = normalize_path(path);
        let key = cache_key(&deploy_id, &path);

        if let Some(body) = self.cache.get(&key).await? {
            let content_type = self.cached_content_type(&key).await;
            debug!(key = %key, "artifact cache hit");
            return Ok(Resolved {
                artifact: Artifact {
                    body: Bytes::from(body),
                    content_type,
                    cache: CacheStatus::Hit,
                },
                cache_fill: None,
            });
        }

        let blob = self.fetch(&deploy_id, &path).await?;
        let cache_fill = self.spawn_fill(key, blob.clone());

        Ok(Resolved {
            artifact: Artifact {
                body: blob.body,
                content_type: blob.content_type,
                cache: CacheStatus::Miss,
            },
            cache_fill: Some(cache_fill),
        })
    }

    async fn cached_content_type(&self, key: &str) -> Option<String> {
        match self.cache.get(&content_type_key(key)).await {
            Ok(value) => value.and_then(|v| String::from_utf8(v).ok()),
            Err(e) => {
                warn!(key = %key, "content type lookup failed: {}", e);
                None
            }
        }
    }

    async fn fetch(&self, deploy_id: &str, path: &str) -> Result<Blob, RouterError> {
        let prefix = dist_prefix(deploy_id);
        if let Some(blob) = self.blobs.get(&format!("{}{}", prefix, path)).await? {
            return Ok(blob);
        }

        if !path.ends_with("index.html") {
            if let Some(blob) = self.blobs.get(&format!("{}{}", prefix, INDEX_PATH)).await? {
                debug!(deploy_id = %deploy_id, path = %path, "serving index.html fallback");
                return Ok(blob);
            }
        }

        Err(RouterError::NotFound(format!("{}{}", deploy_id, path)))
    }

    fn spawn_fill(&self, key: String, blob: Blob) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            if let Err(e) = cache.set(&key, blob.body.to_vec(), ttl).await {
                warn!(key = %key, "failed to cache artifact: {}", e);
                return;
            }
            if let Some(content_type) = blob.content_type {
                if let Err(e) = cache
                    .set(&content_type_key(&key), content_type.into_bytes(), ttl)
                    .await
                {
                    warn!(key = %key, "failed to cache content type: {}", e);
                }
            }
        })
    }
}
