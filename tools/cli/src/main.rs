//! FileStore CLI - Command line interface for storage driver operations.
//!
//! Every command runs against the single backend selected by the
//! configuration file, through the same driver interface the library
//! exposes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use filestore_common::{DeleteRequest, Error, FileRequest, ListKind, ListRequest, OpContext};
use filestore_storage::{create_default_registry, ByteStream, StorageDriver, StoreConfig};

#[derive(Parser)]
#[command(name = "filestore")]
#[command(about = "FileStore - Backend-agnostic file storage")]
#[command(version)]
struct Cli {
    /// Backend configuration file (JSON).
    #[arg(short, long)]
    config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Abort the operation after this many seconds.
    #[arg(short, long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file.
    Put {
        /// Directory to store the file in.
        #[arg(short, long, default_value = "")]
        path: String,

        /// File name within the directory.
        #[arg(short, long)]
        name: String,

        /// Local file to upload.
        #[arg(short, long)]
        source: PathBuf,
    },

    /// Create a directory.
    Mkdir {
        /// Parent directory.
        #[arg(short, long, default_value = "")]
        path: String,

        /// Directory name.
        #[arg(short, long)]
        name: String,
    },

    /// Delete a file or directory marker.
    Rm {
        /// Path to delete. A trailing `/` addresses a directory.
        path: String,
    },

    /// Write a file's content to stdout.
    Cat {
        /// Path to read.
        path: String,
    },

    /// List the direct children of a directory.
    Ls {
        /// Directory to list (default: root).
        #[arg(short, long, default_value = "")]
        path: String,

        /// Entry filter: "all", "file", or "dir".
        #[arg(short, long, default_value = "all")]
        kind: ListKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let driver = open_driver(&cli.config).await?;
    let ctx = operation_context(cli.timeout);

    // Ctrl-C cancels whatever is in flight
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Put { path, name, source } => {
            cmd_put(driver.as_ref(), &ctx, FileRequest::new(path, name), &source).await
        }

        Commands::Mkdir { path, name } => {
            cmd_mkdir(driver.as_ref(), &ctx, FileRequest::new(path, name)).await
        }

        Commands::Rm { path } => cmd_rm(driver.as_ref(), &ctx, DeleteRequest::new(path)).await,

        Commands::Cat { path } => cmd_cat(driver.as_ref(), &ctx, &path).await,

        Commands::Ls { path, kind } => {
            cmd_ls(driver.as_ref(), &ctx, ListRequest::new(path, kind)).await
        }
    }
}

/// Load the backend configuration file.
async fn load_config(path: &Path) -> Result<StoreConfig> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw).context("Invalid config file")
}

/// Resolve the driver named by the configuration file.
async fn open_driver(config_path: &Path) -> Result<Arc<dyn StorageDriver>> {
    let config = load_config(config_path).await?;
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let registry = create_default_registry(http);
    let driver = registry
        .open(&config)
        .with_context(|| format!("Failed to open '{}' backend", config.backend))?;

    debug!(backend = driver.name(), "Driver ready");
    Ok(driver)
}

fn operation_context(timeout: Option<u64>) -> OpContext {
    let ctx = OpContext::new();
    match timeout {
        Some(secs) => ctx.with_timeout(Duration::from_secs(secs)),
        None => ctx,
    }
}

/// Stream a local file into the backend.
async fn cmd_put(
    driver: &dyn StorageDriver,
    ctx: &OpContext,
    req: FileRequest,
    source: &Path,
) -> Result<()> {
    info!("Uploading {} as {}", source.display(), req);

    let file = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("Failed to open source file {}", source.display()))?;
    let content: ByteStream = Box::pin(ReaderStream::new(file).map(|r| r.map_err(Error::from)));

    driver
        .create_file(ctx, &req, content)
        .await
        .context("Failed to upload file")?;

    println!("Uploaded: {}", req.file_key());
    Ok(())
}

/// Create a directory.
async fn cmd_mkdir(driver: &dyn StorageDriver, ctx: &OpContext, req: FileRequest) -> Result<()> {
    driver
        .create_dir(ctx, &req)
        .await
        .context("Failed to create directory")?;

    println!("Created: {}", req.directory_key());
    Ok(())
}

/// Delete a file or directory marker.
async fn cmd_rm(driver: &dyn StorageDriver, ctx: &OpContext, req: DeleteRequest) -> Result<()> {
    driver
        .delete_file(ctx, &req.path)
        .await
        .with_context(|| format!("Failed to delete {}", req.path))?;

    println!("Deleted: {}", req.path);
    Ok(())
}

/// Copy a file's content to stdout.
async fn cmd_cat(driver: &dyn StorageDriver, ctx: &OpContext, path: &str) -> Result<()> {
    let mut stream = driver
        .read_file(ctx, path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;

    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = ctx.run(async { Ok(stream.next().await) }).await? {
        let chunk = chunk.with_context(|| format!("Failed to read {}", path))?;
        stdout.write_all(&chunk).await?;
    }
    stdout.flush().await?;

    Ok(())
}

/// List directory contents.
async fn cmd_ls(driver: &dyn StorageDriver, ctx: &OpContext, req: ListRequest) -> Result<()> {
    let entries = driver
        .list_dir(ctx, &req)
        .await
        .context("Failed to list directory")?;

    if entries.is_empty() {
        println!("Directory is empty.");
        return Ok(());
    }

    for entry in entries {
        if entry.is_dir {
            println!("  [DIR]  {}/", entry.name);
        } else {
            let size_str = entry
                .size
                .map(|s| format!("{} bytes", s))
                .unwrap_or_default();
            println!("  [FILE] {} ({})", entry.name, size_str);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ls_kind() {
        let cli = Cli::try_parse_from(["filestore", "-c", "store.json", "ls", "--kind", "dir"])
            .unwrap();
        match cli.command {
            Commands::Ls { path, kind } => {
                assert_eq!(path, "");
                assert_eq!(kind, ListKind::Dir);
            }
            _ => panic!("expected ls"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let result = Cli::try_parse_from(["filestore", "-c", "store.json", "ls", "--kind", "any"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_open_driver_from_config_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("store.json");
        let root = temp.path().join("data");
        let config = serde_json::json!({"backend": "local", "options": {"root": root}});
        std::fs::write(&config_path, config.to_string()).unwrap();

        let driver = open_driver(&config_path).await.unwrap();
        assert_eq!(driver.name(), "local");
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_open_driver_unknown_backend() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("store.json");
        std::fs::write(&config_path, r#"{"backend": "azure"}"#).unwrap();

        assert!(open_driver(&config_path).await.is_err());
    }

    #[tokio::test]
    async fn test_put_then_cat_roundtrip() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("creds.txt");
        std::fs::write(&source, b"user:pass").unwrap();

        let driver = filestore_storage::LocalDriver::new(temp.path().join("root")).unwrap();
        let ctx = OpContext::new();
        cmd_put(&driver, &ctx, FileRequest::new("/websites", "creds.txt"), &source)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(temp.path().join("root/websites/creds.txt")).unwrap(),
            b"user:pass"
        );
    }

    #[test]
    fn test_operation_context_timeout() {
        assert!(operation_context(None).deadline().is_none());
        assert!(operation_context(Some(30)).deadline().is_some());
    }
}
