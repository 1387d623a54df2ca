//! Google Cloud Storage JSON API client.

use bytes::Bytes;
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use filestore_common::{Error, Result};

use crate::driver::ByteStream;

/// Default GCS API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Chunk size for resumable uploads (must be a multiple of 256KB).
pub const CHUNK_SIZE: usize = 8 * 256 * 1024; // 2MB

/// Characters left unescaped in object names placed in a URL path.
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// GCS object metadata from API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsObject {
    /// Full object name (the key).
    pub name: String,
    /// Object size in bytes, encoded as a string by the API.
    #[serde(default)]
    pub size: Option<String>,
    /// Content type.
    #[serde(default)]
    pub content_type: Option<String>,
}

impl GcsObject {
    /// Get size as u64.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_ref().and_then(|s| s.parse().ok())
    }
}

/// Response from listing objects.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectListResponse {
    #[serde(default)]
    pub items: Vec<GcsObject>,
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// GCS API client bound to one bucket.
///
/// The HTTP client is injected so one connection pool serves every
/// driver in the process.
#[derive(Clone)]
pub struct GcsClient {
    http: Client,
    endpoint: String,
    bucket: String,
    access_token: Option<String>,
}

impl GcsClient {
    /// Create a new client.
    pub fn new(
        http: Client,
        endpoint: &str,
        bucket: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            access_token,
        }
    }

    /// Bucket this client addresses.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            utf8_percent_encode(&self.bucket, OBJECT_NAME),
            utf8_percent_encode(key, OBJECT_NAME)
        )
    }

    fn objects_url(&self) -> String {
        format!(
            "{}/storage/v1/b/{}/o",
            self.endpoint,
            utf8_percent_encode(&self.bucket, OBJECT_NAME)
        )
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint,
            utf8_percent_encode(&self.bucket, OBJECT_NAME)
        )
    }

    /// Attach the bearer token, if any.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<reqwest::Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Failed to {}: {}", action, e)))
    }

    /// Get object metadata.
    pub async fn get_object(&self, key: &str) -> Result<GcsObject> {
        let response = self
            .send(self.http.get(self.object_url(key)), "get object")
            .await?;
        handle_response(response, key).await
    }

    /// Upload a small object in one request.
    pub async fn upload_simple(&self, key: &str, data: Vec<u8>) -> Result<GcsObject> {
        let request = self
            .http
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", key)])
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(data);

        let response = self.send(request, "upload object").await?;
        handle_response(response, key).await
    }

    /// Start a resumable upload session and return its URI.
    pub async fn start_resumable_upload(&self, key: &str) -> Result<String> {
        let request = self
            .http
            .post(self.upload_url())
            .query(&[("uploadType", "resumable"), ("name", key)])
            .header("X-Upload-Content-Type", "application/octet-stream")
            .body(Vec::<u8>::new());

        let response = self.send(request, "start resumable upload").await?;
        if !response.status().is_success() {
            return Err(status_error(response, key).await);
        }

        // Extract upload URI from Location header
        let upload_uri = response
            .headers()
            .get(header::LOCATION)
            .ok_or_else(|| Error::BackendUnavailable("No upload URI in response".to_string()))?
            .to_str()
            .map_err(|e| Error::BackendUnavailable(format!("Invalid upload URI: {}", e)))?
            .to_string();

        Ok(upload_uri)
    }

    /// Upload a chunk to a resumable upload session.
    ///
    /// `total_size` is `None` while more chunks follow. Returns the object
    /// once the final chunk is accepted.
    pub async fn upload_chunk(
        &self,
        upload_uri: &str,
        data: Bytes,
        start_byte: u64,
        total_size: Option<u64>,
    ) -> Result<Option<GcsObject>> {
        let total = total_size.map_or_else(|| "*".to_string(), |t| t.to_string());
        let content_range = if data.is_empty() {
            format!("bytes */{}", total)
        } else {
            let end_byte = start_byte + data.len() as u64 - 1;
            format!("bytes {}-{}/{}", start_byte, end_byte, total)
        };

        let request = self
            .http
            .put(upload_uri)
            .header(header::CONTENT_RANGE, content_range)
            .body(data);

        let response = self.send(request, "upload chunk").await?;
        let status = response.status();

        if status == StatusCode::OK || status == StatusCode::CREATED {
            let object: GcsObject = response.json().await.map_err(|e| {
                Error::BackendUnavailable(format!("Failed to parse upload response: {}", e))
            })?;
            Ok(Some(object))
        } else if status == StatusCode::PERMANENT_REDIRECT && total_size.is_none() {
            // More chunks needed (308 Resume Incomplete)
            Ok(None)
        } else {
            Err(status_error(response, upload_uri).await)
        }
    }

    /// Upload a stream using a resumable session.
    ///
    /// The object only becomes visible when the final chunk is accepted,
    /// so a stream error leaves nothing behind in the bucket.
    pub async fn upload_resumable(&self, key: &str, mut stream: ByteStream) -> Result<GcsObject> {
        let upload_uri = self.start_resumable_upload(key).await?;

        let mut bytes_uploaded = 0u64;
        let mut buffer = Vec::with_capacity(CHUNK_SIZE);

        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);

            // Only send a full chunk once more data is known to follow
            while buffer.len() > CHUNK_SIZE {
                let chunk_to_upload: Vec<u8> = buffer.drain(..CHUNK_SIZE).collect();
                let len = chunk_to_upload.len() as u64;
                self.upload_chunk(&upload_uri, chunk_to_upload.into(), bytes_uploaded, None)
                    .await?;
                bytes_uploaded += len;
            }
        }

        // Final chunk carries the total size and finalizes the object
        let total_size = bytes_uploaded + buffer.len() as u64;
        self.upload_chunk(&upload_uri, buffer.into(), bytes_uploaded, Some(total_size))
            .await?
            .ok_or_else(|| Error::BackendUnavailable("Upload did not complete".to_string()))
    }

    /// Download object content as a stream.
    pub async fn download_stream(&self, key: &str) -> Result<ByteStream> {
        let request = self.http.get(self.object_url(key)).query(&[("alt", "media")]);

        let response = self.send(request, "download object").await?;
        if !response.status().is_success() {
            return Err(status_error(response, key).await);
        }

        let stream = response.bytes_stream().map(|result| {
            result.map_err(|e| Error::BackendUnavailable(format!("Stream read error: {}", e)))
        });

        Ok(Box::pin(stream))
    }

    /// Delete an object.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .send(self.http.delete(self.object_url(key)), "delete object")
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response, key).await)
        }
    }

    /// List objects and common prefixes directly below `prefix`.
    pub async fn list(&self, prefix: &str) -> Result<ObjectListResponse> {
        let mut all = ObjectListResponse::default();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http.get(self.objects_url()).query(&[
                ("prefix", prefix),
                ("delimiter", "/"),
                ("fields", "items(name,size,contentType),prefixes,nextPageToken"),
            ]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = self.send(request, "list objects").await?;
            let page: ObjectListResponse = handle_response(response, prefix).await?;
            all.items.extend(page.items);
            all.prefixes.extend(page.prefixes);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all)
    }
}

/// Parse a successful response or classify the failure.
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    key: &str,
) -> Result<T> {
    if response.status().is_success() {
        response
            .json()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Failed to parse response: {}", e)))
    } else {
        Err(status_error(response, key).await)
    }
}

/// Classify a non-success response.
async fn status_error(response: reqwest::Response, key: &str) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let context = if body.is_empty() {
        key.to_string()
    } else {
        format!("{} - {}", key, body)
    };
    Error::from_status(status.as_u16(), context)
}
