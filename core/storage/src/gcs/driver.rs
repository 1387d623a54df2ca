//! Google Cloud Storage driver implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use filestore_common::path::{self, SEPARATOR};
use filestore_common::{Error, FileEntry, FileRequest, ListRequest, OpContext, Result};

use crate::driver::{ByteStream, StorageDriver};

use super::client::{GcsClient, DEFAULT_ENDPOINT};

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// GCS driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcsConfig {
    /// Bucket holding the files.
    pub bucket: String,
    /// API endpoint; override to target an emulator.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// OAuth2 access token sent as a bearer token.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl GcsConfig {
    /// Create a configuration for `bucket` on the public endpoint.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: default_endpoint(),
            access_token: None,
        }
    }
}

/// Google Cloud Storage driver.
///
/// Directories exist only as zero-length marker objects whose name ends
/// with `/`.
pub struct GcsDriver {
    client: GcsClient,
}

impl GcsDriver {
    /// Create a new GCS driver using a shared HTTP client.
    ///
    /// # Errors
    /// - `InvalidArgument` if the bucket is empty or the endpoint is not a URL
    pub fn new(http: Client, config: GcsConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(Error::InvalidArgument(
                "GCS driver requires a bucket".to_string(),
            ));
        }
        url::Url::parse(&config.endpoint).map_err(|e| {
            Error::InvalidArgument(format!("Invalid GCS endpoint '{}': {}", config.endpoint, e))
        })?;

        let client = GcsClient::new(http, &config.endpoint, config.bucket, config.access_token);
        Ok(Self { client })
    }

    /// Bucket this driver writes to.
    pub fn bucket(&self) -> &str {
        self.client.bucket()
    }
}

/// Log a failed backend call before handing it back to the caller.
fn logged<T>(result: Result<T>, op: &str, key: &str) -> Result<T> {
    if let Err(e) = &result {
        if !e.is_not_found() {
            warn!(key = %key, error = %e, "GCS {} failed", op);
        }
    }
    result
}

#[async_trait]
impl StorageDriver for GcsDriver {
    fn name(&self) -> &str {
        "gcs"
    }

    async fn create_file(
        &self,
        ctx: &OpContext,
        req: &FileRequest,
        content: ByteStream,
    ) -> Result<()> {
        let key = req.checked_file_key()?;
        debug!(bucket = %self.bucket(), key = %key, "Uploading GCS object");

        let result = ctx.run(self.client.upload_resumable(&key, content)).await;
        logged(result, "upload", &key).map(|_| ())
    }

    async fn create_dir(&self, ctx: &OpContext, req: &FileRequest) -> Result<()> {
        let key = req.checked_directory_key()?;
        debug!(bucket = %self.bucket(), key = %key, "Creating GCS directory marker");

        let result = ctx.run(self.client.upload_simple(&key, Vec::new())).await;
        logged(result, "create marker", &key).map(|_| ())
    }

    async fn delete_file(&self, ctx: &OpContext, path: &str) -> Result<()> {
        let key = path::normalize_checked(path)?;
        if key.is_empty() {
            return Err(Error::InvalidArgument(
                "Cannot delete the bucket root".to_string(),
            ));
        }
        debug!(bucket = %self.bucket(), key = %key, "Deleting GCS object");

        logged(ctx.run(self.client.delete(key)).await, "delete", key)
    }

    async fn read_file(&self, ctx: &OpContext, path: &str) -> Result<ByteStream> {
        let key = path::normalize_checked(path)?;
        if key.is_empty() || path::is_directory_key(key) {
            return Err(Error::InvalidArgument(format!(
                "Cannot read a directory: {}",
                path
            )));
        }

        logged(ctx.run(self.client.download_stream(key)).await, "download", key)
    }

    async fn list_dir(&self, ctx: &OpContext, req: &ListRequest) -> Result<Vec<FileEntry>> {
        let key = path::normalize_checked(&req.path)?;
        let prefix = if key.is_empty() || path::is_directory_key(key) {
            key.to_string()
        } else {
            format!("{}{}", key, SEPARATOR)
        };

        let listing = logged(ctx.run(self.client.list(&prefix)).await, "list", &prefix)?;

        let mut results = Vec::new();
        if req.kind.accepts(false) {
            for object in &listing.items {
                match object.name.strip_prefix(&prefix) {
                    // The directory's own marker
                    Some("") | None => {}
                    Some(name) => {
                        results.push(FileEntry::file(name, object.size_bytes().unwrap_or(0)))
                    }
                }
            }
        }
        if req.kind.accepts(true) {
            for dir in &listing.prefixes {
                if let Some(name) = dir
                    .strip_prefix(&prefix)
                    .map(|d| d.trim_end_matches(SEPARATOR))
                    .filter(|d| !d.is_empty())
                {
                    results.push(FileEntry::dir(name));
                }
            }
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn exists(&self, ctx: &OpContext, path: &str) -> Result<bool> {
        let key = path::normalize_checked(path)?;
        if key.is_empty() {
            return Ok(true);
        }

        match ctx.run(self.client.get_object(key)).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Create a GCS driver from configuration.
pub fn create_gcs_driver(http: Client, config: serde_json::Value) -> Result<Arc<dyn StorageDriver>> {
    let gcs_config: GcsConfig = serde_json::from_value(config)
        .map_err(|e| Error::InvalidArgument(format!("Invalid GCS config: {}", e)))?;

    Ok(Arc::new(GcsDriver::new(http, gcs_config)?))
}
