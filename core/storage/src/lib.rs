//! Storage driver abstraction for filestore.
//!
//! Callers address content by slash-separated keys and never see which
//! backend serves them. A local filesystem driver, an in-memory object
//! store and drivers for Google Cloud Storage and Amazon S3 are provided,
//! together with a registry that selects one by name at startup.
//!
//! # Semantics
//! - Keys are normalized the same way by every driver, see
//!   [`filestore_common::path`]
//! - Object stores have no native directories: a directory is a
//!   zero-length marker object whose key ends with `/`
//! - Deleting a marker never touches keys beneath it
//! - Every operation takes an [`OpContext`] and stops early once it is
//!   cancelled or its deadline passes

pub mod driver;
pub mod gcs;
pub mod local;
pub mod memory;
pub mod registry;
pub mod s3;

pub use driver::{byte_stream_from, collect_stream, ByteStream, StorageDriver};
pub use filestore_common::OpContext;
pub use gcs::{GcsConfig, GcsDriver};
pub use local::LocalDriver;
pub use memory::MemoryDriver;
pub use registry::{create_default_registry, DriverFactory, DriverRegistry, StoreConfig};
pub use crate::s3::{S3Config, S3Driver};
