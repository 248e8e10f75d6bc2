// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object-storage adapter.
//!
//! The engine never streams archive bytes itself; it presigns a PUT URL,
//! has the endpoint upload directly, and verifies the result with a HEAD
//! request. HEAD is the only authoritative success signal for an upload.

mod aws;

pub use aws::S3Store;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from object-storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("credentials rejected: {0}")]
    Auth(String),
    #[error("presign failed: {0}")]
    Presign(String),
    #[error("storage error: {0}")]
    Other(String),
}

/// Metadata from a HEAD on the destination object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
}

/// Storage surface the engine needs: presign and verify.
#[async_trait]
pub trait ObjectStore: Clone + Send + Sync + 'static {
    /// Presigned PUT URL for `key`, valid for `expires_in`.
    async fn presign_put(&self, key: &str, expires_in: Duration) -> Result<String, StoreError>;

    /// HEAD the destination object.
    async fn head_object(&self, key: &str) -> Result<ObjectInfo, StoreError>;

    /// Destination bucket, for log lines and summaries.
    fn bucket(&self) -> &str;
}

/// Whether a HEAD result confirms an upload of `expected_size` bytes.
///
/// Tolerance is `max(1 KiB, 1%)`: the control-plane container rewrite and
/// multipart padding shift sizes slightly.
pub fn size_matches(actual: u64, expected_size: Option<u64>) -> bool {
    let Some(expected) = expected_size else {
        return true;
    };
    let tolerance = (expected / 100).max(1024);
    actual.abs_diff(expected) <= tolerance
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
