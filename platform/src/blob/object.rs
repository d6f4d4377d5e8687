//! Blob storage backed by `object_store`.
//!
//! Supports in-memory, local filesystem and S3-compatible backends.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use percent_encoding::percent_decode_str;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::storage::settings::{BlobBackend, BlobSettings};

use super::{content_type_for, Blob, BlobError, BlobStore};

/// Blob store over any `object_store` backend
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
    /// Whether the backend persists object attributes such as content type.
    /// Without them the content type is guessed from the key on read.
    attributes: bool,
}

impl ObjectBlobStore {
    /// Wrap a pre-configured object store
    pub fn with_store(store: Arc<dyn ObjectStore>, attributes: bool) -> Self {
        Self { store, attributes }
    }

    /// Non-persistent store, for tests and single-process runs
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemory::new()), true)
    }

    /// Objects stored as files under `root`
    pub fn local(root: &Path) -> Result<Self, BlobError> {
        std::fs::create_dir_all(root).map_err(|source| BlobError::Local {
            path: root.display().to_string(),
            source,
        })?;
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| BlobError::Config(format!("local store at {}: {e}", root.display())))?;
        Ok(Self::with_store(Arc::new(store), false))
    }

    /// S3 or an S3-compatible service (R2, MinIO)
    pub fn s3(settings: &BlobSettings) -> Result<Self, BlobError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region);

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        if let Some(access_key) = &settings.access_key {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &settings.secret_key {
            builder = builder.with_secret_access_key(secret_key.expose_secret());
        }

        let store = builder
            .build()
            .map_err(|e| BlobError::Config(format!("s3 bucket {}: {e}", settings.bucket)))?;
        Ok(Self::with_store(Arc::new(store), true))
    }

    /// Build the backend named in the settings
    pub fn from_settings(settings: &BlobSettings) -> Result<Self, BlobError> {
        info!(backend = ?settings.backend, "initializing blob store");
        match settings.backend {
            BlobBackend::Memory => Ok(Self::in_memory()),
            BlobBackend::Local => Self::local(&settings.path),
            BlobBackend::S3 => Self::s3(settings),
        }
    }
}

fn store_error(key: &str, err: object_store::Error) -> BlobError {
    BlobError::Store {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), BlobError> {
        let location = ObjectPath::from(key);

        let mut options = PutOptions::default();
        if self.attributes {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            options.attributes = attributes;
        }

        let size = body.len();
        self.store
            .put_opts(&location, PutPayload::from(body), options)
            .await
            .map_err(|e| store_error(key, e))?;

        debug!(key = %key, size, "object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>, BlobError> {
        let location = ObjectPath::from(key);

        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(store_error(key, e)),
        };

        let content_type = if self.attributes {
            result
                .attributes
                .get(&Attribute::ContentType)
                .map(|value| value.to_string())
        } else {
            Some(content_type_for(key))
        };

        let body = result.bytes().await.map_err(|e| store_error(key, e))?;
        Ok(Some(Blob { body, content_type }))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let mut keys: Vec<String> = self
            .locations(prefix)
            .await?
            .iter()
            .map(decoded_key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, BlobError> {
        let locations = self.locations(prefix).await?;
        for location in &locations {
            self.store
                .delete(location)
                .await
                .map_err(|e| store_error(location.as_ref(), e))?;
        }

        if !locations.is_empty() {
            debug!(prefix = %prefix, removed = locations.len(), "objects removed");
        }
        Ok(locations.len())
    }
}

impl ObjectBlobStore {
    async fn locations(&self, prefix: &str) -> Result<Vec<ObjectPath>, BlobError> {
        let location = ObjectPath::from(prefix);
        let objects: Vec<_> = self
            .store
            .list(Some(&location))
            .try_collect()
            .await
            .map_err(|e| store_error(prefix, e))?;
        Ok(objects.into_iter().map(|o| o.location).collect())
    }
}

/// Key as passed to `put`. Object paths keep their parts percent-encoded.
fn decoded_key(location: &ObjectPath) -> String {
    location
        .parts()
        .map(|part| percent_decode_str(part.as_ref()).decode_utf8_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
