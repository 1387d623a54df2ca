//! Local filesystem storage driver.

use async_trait::async_trait;
use futures::{Future, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::driver::{ByteStream, StorageDriver};
use filestore_common::path::{self, SEPARATOR};
use filestore_common::{Error, FileEntry, FileRequest, ListRequest, OpContext, Result};

/// Local filesystem storage driver.
///
/// Maps keys onto a directory tree below `root`. Directories are real
/// filesystem entries and missing parents are created on demand.
pub struct LocalDriver {
    root: PathBuf,
}

impl LocalDriver {
    /// Create a new local driver with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    /// Root directory of this driver.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a validated key to a filesystem path.
    fn to_fs_path(&self, key: &str) -> PathBuf {
        let mut fs_path = self.root.clone();
        for component in key.split(SEPARATOR).filter(|c| !c.is_empty()) {
            fs_path.push(component);
        }
        fs_path
    }

    /// Look up metadata, treating a missing entry as `None`.
    async fn stat(&self, ctx: &OpContext, fs_path: &Path) -> Result<Option<std::fs::Metadata>> {
        match io_op(ctx, fs::metadata(fs_path)).await {
            Ok(meta) => Ok(Some(meta)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Create `dir` and its parents.
///
/// An existing file in the way is a bad path, not a name clash.
async fn create_dirs(ctx: &OpContext, dir: &Path, key: &str) -> Result<()> {
    match io_op(ctx, fs::create_dir_all(dir)).await {
        Err(Error::AlreadyExists(_)) => Err(not_a_directory(key)),
        Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotADirectory => Err(not_a_directory(key)),
        other => other,
    }
}

fn not_a_directory(key: &str) -> Error {
    Error::InvalidArgument(format!("Path crosses an existing file: {}", key))
}

/// Run a filesystem future under the context, classifying its error.
async fn io_op<T>(ctx: &OpContext, fut: impl Future<Output = io::Result<T>>) -> Result<T> {
    ctx.run(async { fut.await.map_err(Error::from) }).await
}

#[async_trait]
impl StorageDriver for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_file(
        &self,
        ctx: &OpContext,
        req: &FileRequest,
        mut content: ByteStream,
    ) -> Result<()> {
        let key = req.checked_file_key()?;
        let fs_path = self.to_fs_path(&key);
        debug!(key = %key, "Creating local file");

        if let Some(parent) = fs_path.parent() {
            create_dirs(ctx, parent, &key).await?;
        }

        // Failures past this point leave a partial file behind.
        let mut file = io_op(ctx, fs::File::create(&fs_path)).await?;
        while let Some(chunk) = ctx.run(async { Ok(content.next().await) }).await? {
            let chunk = chunk?;
            io_op(ctx, file.write_all(&chunk)).await?;
        }
        io_op(ctx, file.flush()).await?;
        io_op(ctx, file.sync_all()).await?;
        Ok(())
    }

    async fn create_dir(&self, ctx: &OpContext, req: &FileRequest) -> Result<()> {
        let key = req.checked_directory_key()?;
        let fs_path = self.to_fs_path(&key);
        debug!(key = %key, "Creating local directory");

        create_dirs(ctx, &fs_path, &key).await
    }

    async fn delete_file(&self, ctx: &OpContext, path: &str) -> Result<()> {
        let key = path::normalize_checked(path)?;
        if key.is_empty() {
            return Err(Error::InvalidArgument(
                "Cannot delete the storage root".to_string(),
            ));
        }
        let fs_path = self.to_fs_path(key);
        debug!(key = %key, "Deleting local path");

        let meta = self
            .stat(ctx, &fs_path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", path)))?;

        if !meta.is_dir() {
            if path::is_directory_key(key) {
                return Err(Error::NotFound(format!("Directory not found: {}", path)));
            }
            return io_op(ctx, fs::remove_file(&fs_path)).await;
        }

        // Check if empty
        let mut entries = io_op(ctx, fs::read_dir(&fs_path)).await?;
        if io_op(ctx, entries.next_entry()).await?.is_some() {
            return Err(Error::InvalidArgument(format!(
                "Directory not empty: {}",
                path
            )));
        }

        io_op(ctx, fs::remove_dir(&fs_path)).await
    }

    async fn read_file(&self, ctx: &OpContext, path: &str) -> Result<ByteStream> {
        let key = path::normalize_checked(path)?;
        let fs_path = self.to_fs_path(key);

        match self.stat(ctx, &fs_path).await? {
            None => return Err(Error::NotFound(format!("File not found: {}", path))),
            Some(meta) if meta.is_dir() => {
                return Err(Error::InvalidArgument(format!(
                    "Cannot read a directory: {}",
                    path
                )))
            }
            Some(_) if path::is_directory_key(key) => {
                return Err(Error::NotFound(format!("Directory not found: {}", path)))
            }
            Some(_) => {}
        }

        let file = io_op(ctx, fs::File::open(&fs_path)).await?;
        let stream = ReaderStream::new(file).map(|chunk| chunk.map_err(Error::from));
        Ok(Box::pin(stream))
    }

    async fn list_dir(&self, ctx: &OpContext, req: &ListRequest) -> Result<Vec<FileEntry>> {
        let key = path::normalize_checked(&req.path)?;
        let fs_path = self.to_fs_path(key);

        match self.stat(ctx, &fs_path).await? {
            None => {
                return Err(Error::NotFound(format!(
                    "Directory not found: {}",
                    req.path
                )))
            }
            Some(meta) if !meta.is_dir() => {
                return Err(Error::InvalidArgument(format!(
                    "Not a directory: {}",
                    req.path
                )))
            }
            Some(_) => {}
        }

        let mut results = Vec::new();
        let mut entries = io_op(ctx, fs::read_dir(&fs_path)).await?;

        while let Some(entry) = io_op(ctx, entries.next_entry()).await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = io_op(ctx, entry.metadata()).await?;
            if !req.kind.accepts(meta.is_dir()) {
                continue;
            }
            results.push(if meta.is_dir() {
                FileEntry::dir(name)
            } else {
                FileEntry::file(name, meta.len())
            });
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn exists(&self, ctx: &OpContext, path: &str) -> Result<bool> {
        let key = path::normalize_checked(path)?;
        let fs_path = self.to_fs_path(key);

        Ok(match self.stat(ctx, &fs_path).await? {
            Some(meta) => meta.is_dir() || !path::is_directory_key(key),
            None => false,
        })
    }
}
