use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::config::AppConfig;
use crate::models::task::Backend;

/// Remote object storage the gateway writes to first.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Public URL of an object under `key`.
    fn link(&self, key: &str) -> String;
}

/// Client for S3-compatible object storage.
pub struct S3Store {
    bucket: Box<Bucket>,
    public_url: String,
}

impl S3Store {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: Option<&str>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
        path_style: bool,
    ) -> Result<Self, StorageError> {
        let region = match endpoint {
            Some(endpoint) => Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region
                .parse()
                .map_err(|e: std::str::Utf8Error| StorageError::Config(e.to_string()))?,
        };

        // Missing keys fall back to the environment and profile chain.
        let credentials = Credentials::new(access_key, secret_key, None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let mut bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;
        if path_style {
            bucket = bucket.with_path_style();
        }

        let public_url = bucket.url();
        Ok(Self { bucket, public_url })
    }

    /// Build from configuration. `Ok(None)` when no bucket is configured.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, StorageError> {
        let Some(bucket_name) = config.s3_bucket.as_deref() else {
            return Ok(None);
        };

        let mut store = Self::new(
            bucket_name,
            &config.s3_region,
            config.s3_endpoint.as_deref(),
            config.s3_access_key.as_deref(),
            config.s3_secret_key.as_deref(),
            config.s3_path_style,
        )?;
        if let Some(url) = &config.s3_public_url {
            store.public_url = url.trim_end_matches('/').to_string();
        }
        Ok(Some(store))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;

        match response.status_code() {
            200..=299 => Ok(()),
            code => Err(StorageError::Status(code)),
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await.map_err(StorageError::S3)?;
        match response.status_code() {
            200..=299 => Ok(response.to_vec()),
            code => Err(StorageError::Status(code)),
        }
    }

    fn link(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}

/// Blob storage rooted at a local directory. The last tier; failures here are fatal.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for `name`. Rejects names that would escape the root.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }

    pub async fn write(&self, name: &str, data: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(path)
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(name)?;
        Ok(tokio::fs::read(path).await?)
    }

    pub fn link(&self, name: &str) -> String {
        format!("{}/{}", self.url_prefix, name)
    }
}

/// Outcome of a gateway write.
#[derive(Debug)]
pub struct StoreOutcome {
    pub backend: Backend,
    /// Why the remote attempt was skipped or failed, when it was.
    pub remote_error: Option<StorageError>,
}

/// Writes blobs to remote storage, degrading to the local directory.
#[derive(Clone)]
pub struct StorageGateway {
    remote: Option<Arc<dyn ObjectStore>>,
    local: LocalStore,
}

impl StorageGateway {
    pub fn new(remote: Option<Arc<dyn ObjectStore>>, local: LocalStore) -> Self {
        Self { remote, local }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Store `data` under `name`.
    ///
    /// Never fails because of the remote tier: an absent or failing remote
    /// falls back to local disk. Only a local write failure is returned.
    pub async fn store(&self, name: &str, data: &[u8]) -> Result<StoreOutcome, StorageError> {
        let remote_error = match &self.remote {
            Some(remote) => match remote.put(name, data, content_type_for(name)).await {
                Ok(()) => {
                    metrics::counter!("storage_writes_total", "backend" => "remote").increment(1);
                    tracing::debug!(name, "Stored blob in remote storage");
                    return Ok(StoreOutcome {
                        backend: Backend::Remote,
                        remote_error: None,
                    });
                }
                Err(e) => {
                    metrics::counter!("storage_remote_failures_total").increment(1);
                    tracing::warn!(name, error = %e, "Remote storage failed, falling back to local disk");
                    e
                }
            },
            None => StorageError::NotConfigured,
        };

        let path = self.local.write(name, data).await?;
        metrics::counter!("storage_writes_total", "backend" => "local").increment(1);
        tracing::debug!(name, path = %path.display(), "Stored blob on local disk");

        Ok(StoreOutcome {
            backend: Backend::Local,
            remote_error: Some(remote_error),
        })
    }

    /// Public link to a blob held by `backend`.
    ///
    /// A remote backend with no remote store configured (e.g. after a
    /// configuration change) yields an empty string.
    pub fn link(&self, name: &str, backend: Backend) -> String {
        match backend {
            Backend::Remote => self
                .remote
                .as_ref()
                .map(|remote| remote.link(name))
                .unwrap_or_default(),
            Backend::Local => self.local.link(name),
        }
    }
}

fn content_type_for(name: &str) -> &'static str {
    match Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Remote storage returned HTTP {0}")]
    Status(u16),

    #[error("Remote storage is not configured")]
    NotConfigured,

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Invalid blob name {0:?}")]
    InvalidName(String),

    #[error("Local storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
