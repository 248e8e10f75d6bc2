// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff for transient transport failures.

use crate::rtr::RtrError;
use std::future::Future;
use std::time::Duration;

const MAX_TRIES: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 2;

/// Run `op` with up to three tries, backing off 1s then 2s between them.
/// Only errors whose message looks like a transient network failure are
/// retried; API rejections surface immediately.
pub(crate) async fn with_backoff<T, F, Fut>(description: &str, op: F) -> Result<T, RtrError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RtrError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_network() && attempt + 1 < MAX_TRIES => {
                let delay = Duration::from_secs(BACKOFF_BASE_SECS.pow(attempt));
                tracing::warn!(
                    description,
                    attempt = attempt + 1,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "transient network error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
