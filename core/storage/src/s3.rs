//! S3-compatible storage driver (AWS S3, MinIO, and similar).

use async_trait::async_trait;
use futures::StreamExt;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use filestore_common::path::{self, SEPARATOR};
use filestore_common::{Error, FileEntry, FileRequest, ListKind, ListRequest, OpContext, Result};

use crate::driver::{ByteStream, StorageDriver};

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_path_style() -> bool {
    true
}

/// S3 driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Bucket holding the files.
    pub bucket: String,
    /// Region name.
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint (MinIO, other S3-compatible stores).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Access key; anonymous access when absent.
    #[serde(default)]
    pub access_key: Option<String>,
    /// Secret key; anonymous access when absent.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Key prefix every object is stored under.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Address the bucket in the URL path rather than the host name.
    #[serde(default = "default_path_style")]
    pub path_style: bool,
}

/// S3-compatible storage driver.
///
/// Directories exist only as zero-length marker objects whose key ends
/// with `/`.
pub struct S3Driver {
    bucket: Box<Bucket>,
    prefix: String,
}

impl S3Driver {
    /// Create a new S3 driver.
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty bucket, bad region or credentials
    pub fn new(config: S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(Error::InvalidArgument(
                "S3 driver requires a bucket".to_string(),
            ));
        }

        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config.region.parse::<Region>().map_err(|e| {
                Error::InvalidArgument(format!("Invalid S3 region '{}': {}", config.region, e))
            })?,
        };

        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                Credentials::new(
                    Some(access_key.as_str()),
                    Some(secret_key.as_str()),
                    None,
                    None,
                    None,
                )
            }
            _ => Credentials::anonymous(),
        }
        .map_err(|e| Error::InvalidArgument(format!("Invalid S3 credentials: {}", e)))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| Error::InvalidArgument(format!("Invalid S3 bucket: {}", e)))?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }

        let prefix = config
            .prefix
            .as_deref()
            .unwrap_or("")
            .trim_matches(SEPARATOR)
            .to_string();

        Ok(Self { bucket, prefix })
    }

    /// Map a driver key to the bucket key.
    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}{}", self.prefix, SEPARATOR, key)
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let full = self.full_key(key);
        let response = self
            .bucket
            .put_object(&full, data)
            .await
            .map_err(|e| s3_error("PUT", &full, e))?;
        check_status(response.status_code(), &full)
    }

    /// Upload a stream, switching to a multipart upload past one part.
    ///
    /// A multipart object only appears once the upload is completed, so a
    /// failed stream leaves nothing behind.
    async fn put_stream(&self, key: &str, content: ByteStream) -> Result<()> {
        let full = self.full_key(key);
        let mut reader = StreamReader::new(content.map(|chunk| chunk.map_err(io::Error::other)));
        let response = self
            .bucket
            .put_object_stream(&mut reader, &full)
            .await
            .map_err(|e| s3_error("PUT", &full, e))?;
        check_status(response.status_code(), &full)
    }

    async fn head(&self, key: &str) -> Result<u16> {
        let full = self.full_key(key);
        let (_, status) = self
            .bucket
            .head_object(&full)
            .await
            .map_err(|e| s3_error("HEAD", &full, e))?;
        Ok(status)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 deletes succeed for absent keys, so check with a HEAD first.
        let status = self.head(key).await?;
        check_status(status, key)?;

        let full = self.full_key(key);
        let response = self
            .bucket
            .delete_object(&full)
            .await
            .map_err(|e| s3_error("DELETE", &full, e))?;
        check_status(response.status_code(), &full)
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        let full = self.full_key(key);
        let response = self
            .bucket
            .get_object_stream(&full)
            .await
            .map_err(|e| s3_error("GET", &full, e))?;
        check_status(response.status_code, &full)?;

        let stream = response.bytes.map(|chunk| {
            chunk.map_err(|e| Error::BackendUnavailable(format!("Stream read error: {}", e)))
        });
        Ok(Box::pin(stream))
    }

    async fn list(&self, prefix: &str, kind: ListKind) -> Result<Vec<FileEntry>> {
        let full = self.full_key(prefix);
        let pages = match self
            .bucket
            .list(full.clone(), Some(SEPARATOR.to_string()))
            .await
        {
            Ok(pages) => pages,
            // Error bodies are not listing XML, so the status is lost in
            // parsing. A HEAD on the prefix recovers it.
            Err(S3Error::SerdeXml(e)) => {
                warn!(key = %full, error = %e, "S3 LIST response unreadable");
                let status = self.head(prefix).await?;
                return Err(match status {
                    401 | 403 => Error::from_status(status, full),
                    _ => Error::BackendUnavailable(format!(
                        "S3 LIST failed for {}: {}",
                        full, e
                    )),
                });
            }
            Err(e) => return Err(s3_error("LIST", &full, e)),
        };

        let mut files = Vec::new();
        let mut dirs = BTreeSet::new();
        for page in pages {
            for object in page.contents {
                match object.key.strip_prefix(&full) {
                    // The directory's own marker
                    Some("") | None => {}
                    Some(name) => files.push(FileEntry::file(name, object.size as u64)),
                }
            }
            for common in page.common_prefixes.into_iter().flatten() {
                if let Some(name) = common
                    .prefix
                    .strip_prefix(&full)
                    .map(|d| d.trim_end_matches(SEPARATOR))
                    .filter(|d| !d.is_empty())
                {
                    dirs.insert(name.to_string());
                }
            }
        }

        let mut results = Vec::new();
        if kind.accepts(false) {
            results.extend(files);
        }
        if kind.accepts(true) {
            results.extend(dirs.into_iter().map(FileEntry::dir));
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }
}

fn s3_error(op: &str, key: &str, err: S3Error) -> Error {
    warn!(key = %key, error = %err, "S3 {} failed", op);
    match err {
        S3Error::HttpFailWithBody(status, _) => Error::from_status(status, key),
        S3Error::Io(e) => Error::from(e),
        other => Error::BackendUnavailable(format!("S3 {} failed for {}: {}", op, key, other)),
    }
}

fn check_status(status: u16, key: &str) -> Result<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(Error::from_status(status, key))
    }
}

#[async_trait]
impl StorageDriver for S3Driver {
    fn name(&self) -> &str {
        "s3"
    }

    async fn create_file(
        &self,
        ctx: &OpContext,
        req: &FileRequest,
        content: ByteStream,
    ) -> Result<()> {
        let key = req.checked_file_key()?;
        debug!(key = %key, "Uploading S3 object");

        ctx.run(self.put_stream(&key, content)).await
    }

    async fn create_dir(&self, ctx: &OpContext, req: &FileRequest) -> Result<()> {
        let key = req.checked_directory_key()?;
        debug!(key = %key, "Creating S3 directory marker");

        ctx.run(self.put(&key, &[])).await
    }

    async fn delete_file(&self, ctx: &OpContext, path: &str) -> Result<()> {
        let key = path::normalize_checked(path)?;
        if key.is_empty() {
            return Err(Error::InvalidArgument(
                "Cannot delete the bucket root".to_string(),
            ));
        }
        debug!(key = %key, "Deleting S3 object");

        ctx.run(self.delete(key)).await
    }

    async fn read_file(&self, ctx: &OpContext, path: &str) -> Result<ByteStream> {
        let key = path::normalize_checked(path)?;
        if key.is_empty() || path::is_directory_key(key) {
            return Err(Error::InvalidArgument(format!(
                "Cannot read a directory: {}",
                path
            )));
        }

        ctx.run(self.get(key)).await
    }

    async fn list_dir(&self, ctx: &OpContext, req: &ListRequest) -> Result<Vec<FileEntry>> {
        let key = path::normalize_checked(&req.path)?;
        let prefix = if key.is_empty() || path::is_directory_key(key) {
            key.to_string()
        } else {
            format!("{}{}", key, SEPARATOR)
        };

        ctx.run(self.list(&prefix, req.kind)).await
    }

    async fn exists(&self, ctx: &OpContext, path: &str) -> Result<bool> {
        let key = path::normalize_checked(path)?;
        if key.is_empty() {
            return Ok(true);
        }

        match ctx.run(self.head(key)).await? {
            404 => Ok(false),
            status => check_status(status, key).map(|_| true),
        }
    }
}

/// Create an S3 driver from configuration.
pub fn create_s3_driver(config: serde_json::Value) -> Result<Arc<dyn StorageDriver>> {
    let s3_config: S3Config = serde_json::from_value(config)
        .map_err(|e| Error::InvalidArgument(format!("Invalid S3 config: {}", e)))?;

    Ok(Arc::new(S3Driver::new(s3_config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{byte_stream_from, collect_stream};
    use bytes::Bytes;
    use futures::stream;
    use serde_json::json;
    use wiremock::matchers::{body_bytes, method, path as url_path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> S3Config {
        S3Config {
            bucket: "bucket".to_string(),
            region: default_region(),
            endpoint: Some(server.uri()),
            access_key: Some("access".to_string()),
            secret_key: Some("secret".to_string()),
            prefix: None,
            path_style: true,
        }
    }

    fn ok_with_etag() -> ResponseTemplate {
        ResponseTemplate::new(200).insert_header("ETag", "\"d41d8cd98f00b204e9800998ecf8427e\"")
    }

    #[test]
    fn test_full_key_with_prefix() {
        let driver = S3Driver::new(S3Config {
            prefix: Some("/tenant-a/".to_string()),
            endpoint: Some("http://localhost:9000".to_string()),
            ..serde_json::from_value(json!({"bucket": "b"})).unwrap()
        })
        .unwrap();

        assert_eq!(driver.full_key("docs/a.txt"), "tenant-a/docs/a.txt");
    }

    #[test]
    fn test_s3_config_defaults() {
        let config: S3Config = serde_json::from_value(json!({"bucket": "b"})).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert!(config.path_style);
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_create_s3_driver_invalid_config() {
        assert!(create_s3_driver(json!({"region": "eu-west-1"})).is_err());
        assert!(create_s3_driver(json!({"bucket": ""})).is_err());
    }

    #[tokio::test]
    async fn test_s3_create_file() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(url_path("/bucket/websites/creds.txt"))
            .and(body_bytes(b"hello".to_vec()))
            .respond_with(ok_with_etag())
            .expect(1)
            .mount(&server)
            .await;

        let driver = S3Driver::new(config(&server)).unwrap();
        driver
            .create_file(
                &OpContext::new(),
                &FileRequest::new("/websites", "creds.txt"),
                byte_stream_from("hello"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_s3_create_dir_writes_marker() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(url_path("/bucket/websites/assets/"))
            .respond_with(ok_with_etag())
            .expect(1)
            .mount(&server)
            .await;

        let driver = S3Driver::new(config(&server)).unwrap();
        driver
            .create_dir(&OpContext::new(), &FileRequest::new("websites", "assets"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_s3_delete_missing_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let driver = S3Driver::new(config(&server)).unwrap();
        let result = driver
            .delete_file(&OpContext::new(), "/websites/creds.txt")
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_s3_delete_existing() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(url_path("/bucket/creds.txt"))
            .respond_with(ok_with_etag())
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(url_path("/bucket/creds.txt"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let driver = S3Driver::new(config(&server)).unwrap();
        driver
            .delete_file(&OpContext::new(), "/creds.txt")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_s3_failed_stream_never_uploads() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ok_with_etag())
            .expect(0)
            .mount(&server)
            .await;

        let content: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"half")),
            Err(Error::BackendUnavailable("source went away".to_string())),
        ]));

        let driver = S3Driver::new(config(&server)).unwrap();
        let result = driver
            .create_file(&OpContext::new(), &FileRequest::new("", "broken.bin"), content)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_s3_read_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/bucket/site/hello.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world!".to_vec()))
            .mount(&server)
            .await;

        let driver = S3Driver::new(config(&server)).unwrap();
        let ctx = OpContext::new();
        let stream = driver.read_file(&ctx, "/site/hello.txt").await.unwrap();
        let data = collect_stream(&ctx, stream).await.unwrap();
        assert_eq!(data, b"hello world!");
    }

    #[tokio::test]
    async fn test_s3_read_missing_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                "<Error><Code>NoSuchKey</Code></Error>",
            ))
            .mount(&server)
            .await;

        let driver = S3Driver::new(config(&server)).unwrap();
        let result = driver.read_file(&OpContext::new(), "missing.txt").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_s3_list_dir() {
        let server = MockServer::start().await;
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bucket</Name>
  <Prefix>site/</Prefix>
  <Delimiter>/</Delimiter>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>false</IsTruncated>
  <Contents>
    <Key>site/</Key>
    <LastModified>2024-01-01T00:00:00.000Z</LastModified>
    <ETag>"d41d8cd98f00b204e9800998ecf8427e"</ETag>
    <Size>0</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>site/index.html</Key>
    <LastModified>2024-01-01T00:00:00.000Z</LastModified>
    <ETag>"5eb63bbbe01eeed093cb22bb8f5acdc3"</ETag>
    <Size>12</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <CommonPrefixes>
    <Prefix>site/assets/</Prefix>
  </CommonPrefixes>
</ListBucketResult>"#;
        Mock::given(method("GET"))
            .and(query_param("prefix", "site/"))
            .and(query_param("delimiter", "/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let driver = S3Driver::new(config(&server)).unwrap();
        let ctx = OpContext::new();

        let all = driver
            .list_dir(&ctx, &ListRequest::new("/site", ListKind::All))
            .await
            .unwrap();
        assert_eq!(
            all,
            vec![FileEntry::dir("assets"), FileEntry::file("index.html", 12)]
        );

        let dirs = driver
            .list_dir(&ctx, &ListRequest::new("site/", ListKind::Dir))
            .await
            .unwrap();
        assert_eq!(dirs, vec![FileEntry::dir("assets")]);
    }

    #[tokio::test]
    async fn test_s3_list_forbidden_is_permission_denied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let driver = S3Driver::new(config(&server)).unwrap();
        let result = driver
            .list_dir(&OpContext::new(), &ListRequest::new("site", ListKind::All))
            .await;
        assert!(matches!(result, Err(Error::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_s3_exists() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(url_path("/bucket/site/index.html"))
            .respond_with(ok_with_etag())
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(url_path("/bucket/site/missing.html"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let driver = S3Driver::new(config(&server)).unwrap();
        let ctx = OpContext::new();
        assert!(driver.exists(&ctx, "/site/index.html").await.unwrap());
        assert!(!driver.exists(&ctx, "site/missing.html").await.unwrap());
        assert!(driver.exists(&ctx, "/").await.unwrap());
    }
}
