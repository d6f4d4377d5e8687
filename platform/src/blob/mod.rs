//! Object storage for deployment sources and build output
//!
//! Keys are plain strings namespaced per deployment (`source/{id}/...`,
//! `dist/{id}/...`). Directory uploads keep the relative layout of the local
//! tree with forward-slash separators on every platform.

pub mod object;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::filesys::dir::Dir;

pub use object::ObjectBlobStore;

/// Content type used when nothing better can be guessed
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("failed to read {path}: {source}")]
    Local {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("object store error for {key}: {reason}")]
    Store { key: String, reason: String },

    #[error("invalid blob configuration: {0}")]
    Config(String),
}

/// A stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Guess a MIME type from a path or key extension
pub fn content_type_for(path: impl AsRef<Path>) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

/// Join a key prefix and a relative local path into an object key
pub fn object_key(prefix: &str, relative: &Path) -> String {
    let relative = relative.to_string_lossy().replace('\\', "/");
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), BlobError>;

    /// Fetch an object, `Ok(None)` when absent
    async fn get(&self, key: &str) -> Result<Option<Blob>, BlobError>;

    /// Keys under `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError>;

    /// Remove every object under `prefix`; returns how many were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, BlobError>;

    /// Upload a local directory tree under `prefix`.
    ///
    /// Fails if `local` is not an existing directory. Returns the number of
    /// files uploaded.
    async fn put_directory(&self, local: &Path, prefix: &str) -> Result<usize, BlobError> {
        let dir = Dir::new(local);
        let files = dir.walk_files().await.map_err(|source| BlobError::Local {
            path: local.display().to_string(),
            source,
        })?;

        for relative in &files {
            let full = local.join(relative);
            let body = tokio::fs::read(&full)
                .await
                .map_err(|source| BlobError::Local {
                    path: full.display().to_string(),
                    source,
                })?;
            let key = object_key(prefix, relative);
            let content_type = content_type_for(relative);
            self.put(&key, Bytes::from(body), &content_type).await?;
        }

        debug!(prefix = %prefix, files = files.len(), "directory uploaded");
        Ok(files.len())
    }
}
