//! Google Cloud Storage driver for FileStore.
//!
//! This module provides an object-store backend on the GCS JSON API with:
//! - Resumable uploads, so a failed stream never leaves a truncated object
//! - Zero-length marker objects standing in for directories
//! - A shared, injected HTTP client

pub mod client;
pub mod driver;

pub use client::GcsClient;
pub use driver::{create_gcs_driver, GcsConfig, GcsDriver};
