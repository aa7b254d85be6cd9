use std::path::{Path, PathBuf};

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tracing::info;

use crate::error::StoreError;
use crate::settings::StorageSettings;

pub const CONTENT_TYPE_HTML: &str = "text/html";

/// Artifact files on local disk, one `<name>.html` per company.
pub struct ArtifactDir {
    root: PathBuf,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactDir { root: root.into() }
    }

    pub fn key(name: &str) -> String {
        format!("{name}.html")
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(Self::key(name))
    }

    /// Write the artifact, replacing any earlier one with the same name.
    pub async fn write(&self, name: &str, contents: &str) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;
        let path = self.path_for(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(path)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError>;
}

/// Read `path` back from disk and upload it under `key`.
pub async fn upload_file(
    store: &dyn ObjectStore,
    path: &Path,
    key: &str,
) -> Result<(), StoreError> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    store.put(key, &body, CONTENT_TYPE_HTML).await
}

/// S3-compatible bucket (Cloudflare R2 by default).
pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, StoreError> {
        let missing = |field: &str| StoreError::Config(format!("{field} is not set"));
        let endpoint = settings.endpoint.clone().ok_or_else(|| missing("endpoint"))?;
        let access_key = settings
            .access_key_id
            .as_deref()
            .ok_or_else(|| missing("access key id"))?;
        let secret_key = settings
            .secret_access_key
            .as_deref()
            .ok_or_else(|| missing("secret access key"))?;
        let bucket_name = settings.bucket.as_deref().ok_or_else(|| missing("bucket"))?;

        let region = Region::Custom {
            region: settings.region.clone().unwrap_or_else(|| "auto".into()),
            endpoint,
        };
        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StoreError::Config(e.to_string()))?
            .with_path_style();

        info!("Uploads go to bucket {}", bucket_name);
        Ok(S3Store { bucket })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, body, content_type)
            .await
            .map_err(|e| StoreError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StoreError::Upload {
                key: key.to_string(),
                message: format!("status {status}"),
            });
        }
        Ok(())
    }
}
