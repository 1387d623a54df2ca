//! Common utilities and types shared across the FileStore crates.
//!
//! This module provides the request types, the path normalization rules
//! and the error taxonomy every storage driver speaks.

pub mod context;
pub mod error;
pub mod path;
pub mod types;

pub use context::OpContext;
pub use error::{Error, Result};
pub use types::{DeleteRequest, FileEntry, FileRequest, ListKind, ListRequest};
