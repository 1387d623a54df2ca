//! In-memory storage driver for testing.
//!
//! Models a flat object namespace: no native directories, directory
//! markers are zero-length objects whose key ends with `/`, and deletes
//! address exactly one key.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::driver::{byte_stream_from, collect_stream, ByteStream, StorageDriver};
use filestore_common::path::{self, SEPARATOR};
use filestore_common::{Error, FileEntry, FileRequest, ListRequest, OpContext, Result};

/// In-memory object-store driver.
///
/// All data is stored in memory and lost on drop. Clones share storage.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryDriver {
    /// Create a new empty memory driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, in order.
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Bytes>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Bytes>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_file(
        &self,
        ctx: &OpContext,
        req: &FileRequest,
        content: ByteStream,
    ) -> Result<()> {
        let key = req.checked_file_key()?;
        debug!(key = %key, "Creating memory object");

        // Nothing becomes visible until the stream is fully drained.
        let data = collect_stream(ctx, content).await?;
        self.write().insert(key, Bytes::from(data));
        Ok(())
    }

    async fn create_dir(&self, ctx: &OpContext, req: &FileRequest) -> Result<()> {
        let key = req.checked_directory_key()?;
        ctx.check()?;
        debug!(key = %key, "Creating memory directory marker");

        self.write().insert(key, Bytes::new());
        Ok(())
    }

    async fn delete_file(&self, ctx: &OpContext, path: &str) -> Result<()> {
        let key = path::normalize_checked(path)?;
        if key.is_empty() {
            return Err(Error::InvalidArgument(
                "Cannot delete the bucket root".to_string(),
            ));
        }
        ctx.check()?;

        self.write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", path)))
    }

    async fn read_file(&self, ctx: &OpContext, path: &str) -> Result<ByteStream> {
        let key = path::normalize_checked(path)?;
        if path::is_directory_key(key) || key.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "Cannot read a directory: {}",
                path
            )));
        }
        ctx.check()?;

        let data = self
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", path)))?;
        Ok(byte_stream_from(data))
    }

    async fn list_dir(&self, ctx: &OpContext, req: &ListRequest) -> Result<Vec<FileEntry>> {
        let key = path::normalize_checked(&req.path)?;
        ctx.check()?;

        let prefix = if key.is_empty() || path::is_directory_key(key) {
            key.to_string()
        } else {
            format!("{}{}", key, SEPARATOR)
        };

        let objects = self.read();
        let mut dirs = BTreeSet::new();
        let mut results = Vec::new();

        for (object_key, data) in objects.range(prefix.clone()..) {
            let Some(relative) = object_key.strip_prefix(&prefix) else {
                break;
            };
            match relative.split_once(SEPARATOR) {
                // The directory's own marker
                None if relative.is_empty() => {}
                None => {
                    if req.kind.accepts(false) {
                        results.push(FileEntry::file(relative, data.len() as u64));
                    }
                }
                Some((dir, _)) => {
                    dirs.insert(dir.to_string());
                }
            }
        }

        if req.kind.accepts(true) {
            results.extend(dirs.into_iter().map(FileEntry::dir));
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn exists(&self, ctx: &OpContext, path: &str) -> Result<bool> {
        let key = path::normalize_checked(path)?;
        ctx.check()?;
        Ok(key.is_empty() || self.read().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filestore_common::ListKind;
    use futures::stream;

    #[tokio::test]
    async fn test_create_read() {
        let driver = MemoryDriver::new();
        let ctx = OpContext::new();

        driver
            .create_file(&ctx, &FileRequest::new("/", "test.txt"), byte_stream_from("Hello, World!"))
            .await
            .unwrap();

        let data = collect_stream(&ctx, driver.read_file(&ctx, "test.txt").await.unwrap())
            .await
            .unwrap();
        assert_eq!(data, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_create_dir_writes_marker() {
        let driver = MemoryDriver::new();
        driver
            .create_dir(&OpContext::new(), &FileRequest::new("/websites", "assets"))
            .await
            .unwrap();

        assert_eq!(driver.keys(), vec!["websites/assets/".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_marker_keeps_descendants() {
        let driver = MemoryDriver::new();
        let ctx = OpContext::new();
        driver
            .create_dir(&ctx, &FileRequest::new("", "docs"))
            .await
            .unwrap();
        driver
            .create_file(&ctx, &FileRequest::new("docs", "a.txt"), byte_stream_from("a"))
            .await
            .unwrap();

        driver.delete_file(&ctx, "/docs/").await.unwrap();

        assert_eq!(driver.keys(), vec!["docs/a.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_object() {
        let driver = MemoryDriver::new();
        let content: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"half")),
            Err(Error::Io(std::io::Error::other("reset"))),
        ]));

        let result = driver
            .create_file(&OpContext::new(), &FileRequest::new("", "broken.bin"), content)
            .await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(driver.keys().is_empty());
    }

    #[tokio::test]
    async fn test_list_flat_namespace() {
        let driver = MemoryDriver::new();
        let ctx = OpContext::new();
        driver
            .create_dir(&ctx, &FileRequest::new("dir", "sub"))
            .await
            .unwrap();
        driver
            .create_file(&ctx, &FileRequest::new("dir", "file1.txt"), byte_stream_from(vec![1]))
            .await
            .unwrap();
        driver
            .create_file(&ctx, &FileRequest::new("dir/implicit", "x.txt"), byte_stream_from(vec![1]))
            .await
            .unwrap();
        driver
            .create_file(&ctx, &FileRequest::new("", "dirt.txt"), byte_stream_from(vec![1]))
            .await
            .unwrap();

        let all = driver
            .list_dir(&ctx, &ListRequest::new("/dir", ListKind::All))
            .await
            .unwrap();
        assert_eq!(
            all,
            vec![
                FileEntry::file("file1.txt", 1),
                FileEntry::dir("implicit"),
                FileEntry::dir("sub"),
            ]
        );

        let files = driver
            .list_dir(&ctx, &ListRequest::new("", ListKind::File))
            .await
            .unwrap();
        assert_eq!(files, vec![FileEntry::file("dirt.txt", 1)]);
    }

    #[tokio::test]
    async fn test_read_marker_fails() {
        let driver = MemoryDriver::new();
        let ctx = OpContext::new();
        driver
            .create_dir(&ctx, &FileRequest::new("", "docs"))
            .await
            .unwrap();

        let result = driver.read_file(&ctx, "docs/").await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
