//! Storage driver trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::pin::Pin;

use filestore_common::{FileEntry, FileRequest, ListRequest, OpContext, Result};

/// Byte stream type for upload/download operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Build a single-chunk stream from in-memory content.
pub fn byte_stream_from(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Drain a stream into one buffer, checking the context between chunks.
///
/// # Errors
/// - The first error yielded by the stream
/// - `Cancelled` / `DeadlineExceeded` if the context is done
pub async fn collect_stream(ctx: &OpContext, mut stream: ByteStream) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = ctx.run(async { Ok(stream.next().await) }).await? {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

/// Storage driver trait for different backends.
///
/// Callers depend only on this trait; the concrete driver is picked once
/// at startup. Every operation takes the caller's [`OpContext`] and stops
/// when it is cancelled or its deadline passes.
///
/// Paths handed to drivers may carry a leading separator; drivers
/// normalize them with [`filestore_common::path`] before use.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Get the driver name (e.g., "local", "gcs", "s3").
    fn name(&self) -> &str;

    /// Create or overwrite a file.
    ///
    /// # Postconditions
    /// - The whole stream is stored at `req`'s file key
    /// - Object stores never expose a truncated object; the local backend
    ///   may leave a partially written file on failure
    ///
    /// # Errors
    /// - `InvalidArgument` for a malformed path or name
    /// - `Io` if the stream yields an error
    /// - `BackendUnavailable` / `PermissionDenied` from the backend
    async fn create_file(&self, ctx: &OpContext, req: &FileRequest, content: ByteStream)
        -> Result<()>;

    /// Create a directory.
    ///
    /// # Postconditions
    /// - Local: the directory exists, including parents
    /// - Object stores: a zero-length marker exists at the directory key
    async fn create_dir(&self, ctx: &OpContext, req: &FileRequest) -> Result<()>;

    /// Delete the file or directory marker at exactly `path`.
    ///
    /// Never removes a directory's descendants.
    ///
    /// # Errors
    /// - `NotFound` if nothing exists at `path`
    /// - `InvalidArgument` for a malformed path or a non-empty local directory
    async fn delete_file(&self, ctx: &OpContext, path: &str) -> Result<()>;

    /// Read a file as a stream.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist
    /// - `InvalidArgument` if `path` names a directory
    async fn read_file(&self, ctx: &OpContext, path: &str) -> Result<ByteStream>;

    /// List direct children of a directory, sorted by name.
    async fn list_dir(&self, ctx: &OpContext, req: &ListRequest) -> Result<Vec<FileEntry>>;

    /// Check if a file or directory exists at `path`.
    async fn exists(&self, ctx: &OpContext, path: &str) -> Result<bool>;
}
