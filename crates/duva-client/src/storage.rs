//! Extract storage on top of the `object_store` crate.
//!
//! [`ObjectStoreStorage`] implements [`ObjectStorage`] for S3 (and
//! S3-compatible endpoints), a local directory and an in-memory store.
//! Only S3 can hand out real presigned URLs; the local backend returns a
//! `file://` URL and the in-memory backend refuses.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use duva_core::error::AppError;
use duva_core::{ObjectStorage, StorageConfig};
use futures::StreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ObjectStore, PutPayload};
use reqwest::{Method, Url};
use tokio::io::AsyncWriteExt;

fn storage_error(e: object_store::Error) -> AppError {
    AppError::StorageError(e.to_string())
}

#[derive(Clone)]
enum Presigner {
    S3(Arc<AmazonS3>),
    Local(PathBuf),
    Unsupported,
}

/// [`ObjectStorage`] over any `object_store` backend.
///
/// # Examples
///
/// ```no_run
/// use duva_client::ObjectStoreStorage;
/// use duva_core::StorageConfig;
///
/// # fn example() -> Result<(), duva_core::AppError> {
/// let storage = ObjectStoreStorage::from_config(&StorageConfig::from_env()?)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
    presigner: Presigner,
}

impl ObjectStoreStorage {
    pub fn from_config(config: &StorageConfig) -> Result<Self, AppError> {
        match config {
            StorageConfig::S3 {
                bucket,
                region,
                endpoint,
            } => Self::s3(bucket, region.as_deref(), endpoint.as_deref()),
            StorageConfig::Local { root } => Self::local(root),
        }
    }

    /// S3 bucket. Credentials are read from the `AWS_*` environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the builder rejects the settings.
    pub fn s3(bucket: &str, region: Option<&str>, endpoint: Option<&str>) -> Result<Self, AppError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let s3 = Arc::new(
            builder
                .build()
                .map_err(|e| AppError::ConfigError(e.to_string()))?,
        );
        tracing::info!(bucket, "Using S3 extract storage");

        Ok(Self {
            store: s3.clone(),
            presigner: Presigner::S3(s3),
        })
    }

    /// Directory on the local filesystem, created if missing.
    pub fn local(root: impl AsRef<Path>) -> Result<Self, AppError> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = std::fs::canonicalize(root.as_ref())?;
        let store =
            LocalFileSystem::new_with_prefix(&root).map_err(|e| AppError::ConfigError(e.to_string()))?;
        tracing::info!(root = %root.display(), "Using local extract storage");

        Ok(Self {
            store: Arc::new(store),
            presigner: Presigner::Local(root),
        })
    }

    /// Non-persistent store for tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            presigner: Presigner::Unsupported,
        }
    }

    fn object_path(key: &str) -> Result<ObjectPath, AppError> {
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(AppError::StorageError(format!("invalid object key '{}'", key)));
        }
        Ok(ObjectPath::from(key))
    }
}

impl ObjectStorage for ObjectStoreStorage {
    async fn put_file(&self, local: &Path, key: &str) -> Result<(), AppError> {
        let path = Self::object_path(key)?;
        let content = tokio::fs::read(local).await?;
        let size = content.len();
        self.store
            .put(&path, PutPayload::from(content))
            .await
            .map_err(storage_error)?;

        tracing::debug!(key, bytes = size, "Object stored");
        Ok(())
    }

    async fn get_to_path(&self, key: &str, dest: &Path) -> Result<(), AppError> {
        let path = Self::object_path(key)?;
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(AppError::NotFound(format!("object {}", key)));
            }
            Err(e) => return Err(storage_error(e)),
        };

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = result.into_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk.map_err(storage_error)?).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = Self::object_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let path = Self::object_path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn presign(&self, key: &str, expires_in: Duration) -> Result<String, AppError> {
        let path = Self::object_path(key)?;
        match &self.presigner {
            Presigner::S3(s3) => s3
                .signed_url(Method::GET, &path, expires_in)
                .await
                .map(String::from)
                .map_err(storage_error),
            Presigner::Local(root) => Url::from_file_path(root.join(key))
                .map(String::from)
                .map_err(|_| AppError::StorageError(format!("no file URL for '{}'", key))),
            Presigner::Unsupported => Err(AppError::StorageError(
                "presigned URLs are not supported by this backend".to_string(),
            )),
        }
    }
}
