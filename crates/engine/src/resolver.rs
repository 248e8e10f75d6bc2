// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hostname → agent resolution with a short-lived cache.

use crate::error::EngineError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use triage_adapters::CloudClient;
use triage_core::HostInfo;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Resolves hostnames through the device-query surface and caches the
/// result so batch runs don't repeat lookups.
#[derive(Clone)]
pub struct HostResolver<C: CloudClient> {
    client: C,
    ttl: Duration,
    cache: Arc<Mutex<HashMap<String, (HostInfo, Instant)>>>,
}

impl<C: CloudClient> HostResolver<C> {
    pub fn new(client: C) -> Self {
        Self::with_ttl(client, DEFAULT_TTL)
    }

    pub fn with_ttl(client: C, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve a hostname to its agent identity.
    ///
    /// Substring match on the control plane side; the first returned
    /// record wins. Missing agent-id or customer-id is `NotFound`.
    pub async fn resolve(&self, hostname: &str) -> Result<HostInfo, EngineError> {
        if hostname.is_empty() {
            return Err(EngineError::NotFound("empty hostname".to_string()));
        }
        if let Some(cached) = self.cached(hostname) {
            return Ok(cached);
        }

        let filter = format!("hostname:*'*{hostname}*'");
        let aids = self.client.query_hosts(&filter).await?;
        if aids.is_empty() {
            return Err(EngineError::NotFound(hostname.to_string()));
        }

        let details = self.client.get_host_details(&aids).await?;
        let Some(record) = details.into_iter().next() else {
            return Err(EngineError::NotFound(hostname.to_string()));
        };
        if record.device_id.is_empty() || record.cid.is_empty() {
            return Err(EngineError::NotFound(format!(
                "{hostname}: record missing agent or customer id"
            )));
        }
        let platform = record.platform_name.parse().map_err(|_| {
            EngineError::NotFound(format!(
                "{hostname}: unsupported platform {:?}",
                record.platform_name
            ))
        })?;

        let host = HostInfo {
            hostname: record.hostname,
            aid: record.device_id,
            cid: record.cid,
            platform,
            os_version: record.os_version,
            cpu_name: record.cpu_name,
        };
        tracing::info!(
            hostname,
            aid = %host.aid,
            cid = %host.cid,
            platform = %host.platform,
            "host resolved"
        );
        self.cache
            .lock()
            .insert(hostname.to_string(), (host.clone(), Instant::now()));
        Ok(host)
    }

    fn cached(&self, hostname: &str) -> Option<HostInfo> {
        let mut cache = self.cache.lock();
        match cache.get(hostname) {
            Some((host, stored_at)) if stored_at.elapsed() < self.ttl => Some(host.clone()),
            Some(_) => {
                cache.remove(hostname);
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
