// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push-upload support: time budgets, proxy URL rewriting, HEAD verify.
//!
//! The engine never streams archive bytes; the endpoint PUTs them with
//! platform-native tooling. The remote process exit code is advisory
//! only; a HEAD on the destination object is the sole authoritative
//! success signal.

use crate::error::EngineError;
use std::time::Duration;
use triage_adapters::{s3, ObjectStore, StoreError};

/// Assumed sustained upload rate for budget estimation.
const ASSUMED_RATE: u64 = 2 * 1024 * 1024; // bytes per second
const MIN_BUDGET: Duration = Duration::from_secs(300);
const WINDOWS_MAX_BUDGET: Duration = Duration::from_secs(1_800);

/// Upload budget for Windows endpoints: size at 2 MB/s with a 1.5×
/// safety factor, clamped to [5 min, 30 min].
pub fn windows_upload_budget(size: u64) -> Duration {
    let estimated = Duration::from_secs(size / ASSUMED_RATE * 3 / 2);
    estimated.clamp(MIN_BUDGET, WINDOWS_MAX_BUDGET)
}

/// Upload budget for Unix endpoints: size at 2 MB/s with a 2.5× safety
/// factor, floored at 5 min and capped by the platform maximum (the
/// configured upload ceiling).
pub fn unix_upload_budget(size: u64, cap: Duration) -> Duration {
    let estimated = Duration::from_secs(size / ASSUMED_RATE * 5 / 2);
    estimated.clamp(MIN_BUDGET.min(cap), cap)
}

/// Rewrite the presigned URL's host to the egress proxy FQDN, keeping
/// path, query and signature intact.
pub fn rewrite_presigned_host(url: &str, proxy_host: &str) -> Result<String, EngineError> {
    let mut parsed = url::Url::parse(url)
        .map_err(|err| EngineError::TransferFailed(format!("presigned url unparsable: {err}")))?;
    parsed
        .set_host(Some(proxy_host))
        .map_err(|err| EngineError::TransferFailed(format!("proxy host rejected: {err}")))?;
    Ok(parsed.into())
}

/// HEAD-verify the destination object, optionally against an expected
/// size (tolerance `max(1 KiB, 1%)`).
pub async fn verify_uploaded<S: ObjectStore>(
    store: &S,
    key: &str,
    expected_size: Option<u64>,
) -> Result<u64, EngineError> {
    match store.head_object(key).await {
        Ok(info) => {
            if !s3::size_matches(info.size, expected_size) {
                return Err(EngineError::TransferFailed(format!(
                    "s3://{}/{key}: size {} does not match expected {:?}",
                    store.bucket(),
                    info.size,
                    expected_size
                )));
            }
            tracing::info!(
                bucket = store.bucket(),
                key,
                size = info.size,
                "upload verified by head"
            );
            Ok(info.size)
        }
        Err(StoreError::NotFound(target)) => Err(EngineError::TransferFailed(format!(
            "{target}: object absent after upload"
        ))),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
