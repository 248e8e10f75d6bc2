// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed file retrieval and the put-file repository.
//!
//! Pulling a file off an endpoint is three phases: the active-responder
//! `get`, SHA retrieval (the control plane ingests the payload and only
//! then exposes its hash), and the content fetch. Each phase has its own
//! budget and keeps the session pulsed; multi-GB archives over slow links
//! legitimately take hours.

use crate::error::EngineError;
use crate::session::{PulseTracker, SessionManager};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use triage_adapters::{CloudClient, RtrError};
use triage_core::{with_7z_extension, Session};

/// Tested worst-case transfer rate over high-latency links.
const WORST_CASE_RATE: u64 = 30 * 1024; // bytes per second
/// Floor for the `get`-phase budget.
const MIN_GET_TIMEOUT: Duration = Duration::from_secs(600);
const GET_POLL_INTERVAL: Duration = Duration::from_secs(2);
const SHA_POLL_INTERVAL: Duration = Duration::from_secs(5);
const CONTENT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// File retrieval over an open session.
#[derive(Clone)]
pub struct FileTransfer<C: CloudClient> {
    sessions: SessionManager<C>,
    sha_timeout: Duration,
    content_timeout: Duration,
}

impl<C: CloudClient> FileTransfer<C> {
    pub fn new(sessions: SessionManager<C>, timeouts: &triage_config::Timeouts) -> Self {
        Self {
            sessions,
            sha_timeout: timeouts.sha_retrieval(),
            content_timeout: timeouts.download(),
        }
    }

    /// Size-aware budget for the `get` phase.
    fn get_timeout(expected_size: Option<u64>) -> Duration {
        match expected_size {
            Some(size) if size > 0 => {
                MIN_GET_TIMEOUT.max(Duration::from_secs(size / WORST_CASE_RATE))
            }
            _ => Duration::from_secs(18_000),
        }
    }

    /// Pull `remote_path` into `local_dir`.
    ///
    /// The control plane rewrites the payload into a 7z container, so the
    /// local file always carries a `.7z` extension. Returns the written
    /// path after verifying the on-disk size against the received buffer.
    pub async fn download(
        &self,
        session: &mut Session,
        remote_path: &str,
        local_dir: &Path,
        expected_size: Option<u64>,
    ) -> Result<PathBuf, EngineError> {
        let file_name = remote_file_name(remote_path);
        let client = self.sessions.client().clone();

        // Phase A: issue the get and wait for the endpoint to finish
        // streaming the file into the cloud.
        let cloud_request_id = client
            .execute_active_responder(
                "get",
                &format!("get {remote_path}"),
                &session.device_id,
                &session.session_id,
            )
            .await?;
        tracing::info!(remote_path, %cloud_request_id, "get command issued");

        let get_budget = Self::get_timeout(expected_size);
        let mut tracker = PulseTracker::new();
        let phase_start = Instant::now();
        loop {
            if phase_start.elapsed() > get_budget {
                return Err(EngineError::CommandTimeout {
                    context: format!("get {remote_path}"),
                    elapsed: phase_start.elapsed(),
                });
            }
            tracker.tick(&self.sessions, session).await?;
            let status = client
                .check_active_responder_status(&cloud_request_id)
                .await?;
            if status.complete {
                if !status.stderr.is_empty() {
                    return Err(EngineError::TransferFailed(format!(
                        "get {remote_path}: {}",
                        status.stderr
                    )));
                }
                break;
            }
            tokio::time::sleep(GET_POLL_INTERVAL).await;
        }
        tracing::info!(remote_path, "get command completed");

        // Phase B: wait for the control plane to publish the SHA. Do NOT
        // re-issue the get on timeout; that duplicates remote artifacts.
        let sha256 = self
            .wait_for_sha(session, &cloud_request_id, remote_path)
            .await?;
        tracing::info!(remote_path, %sha256, "file sha retrieved");

        tokio::time::sleep(CONTENT_POLL_INTERVAL).await;

        // Phase C: fetch the rewritten container.
        let bytes = self
            .fetch_content(session, &sha256, &file_name, remote_path)
            .await?;

        let local_path = local_dir.join(with_7z_extension(&file_name));
        write_verified(&local_path, &bytes).await?;
        tracing::info!(
            path = %local_path.display(),
            bytes = bytes.len(),
            "file written and size-verified"
        );
        Ok(local_path)
    }

    async fn wait_for_sha(
        &self,
        session: &mut Session,
        cloud_request_id: &str,
        remote_path: &str,
    ) -> Result<String, EngineError> {
        let client = self.sessions.client().clone();
        let mut tracker = PulseTracker::new();
        let phase_start = Instant::now();
        loop {
            if phase_start.elapsed() > self.sha_timeout {
                return Err(EngineError::TransferFailed(format!(
                    "sha for {remote_path} did not arrive within {}s",
                    self.sha_timeout.as_secs()
                )));
            }
            tracker.tick(&self.sessions, session).await?;
            let files = client.list_session_files(&session.session_id).await?;
            if let Some(found) = files
                .iter()
                .find(|f| f.cloud_request_id == cloud_request_id && !f.sha256.is_empty())
            {
                return Ok(found.sha256.clone());
            }
            tokio::time::sleep(SHA_POLL_INTERVAL).await;
        }
    }

    async fn fetch_content(
        &self,
        session: &mut Session,
        sha256: &str,
        file_name: &str,
        remote_path: &str,
    ) -> Result<Vec<u8>, EngineError> {
        let client = self.sessions.client().clone();
        let mut tracker = PulseTracker::new();
        let phase_start = Instant::now();
        loop {
            if phase_start.elapsed() > self.content_timeout {
                return Err(EngineError::TransferFailed(format!(
                    "content for {remote_path} not available within {}s",
                    self.content_timeout.as_secs()
                )));
            }
            tracker.tick(&self.sessions, session).await?;
            match client
                .get_extracted_file(&session.session_id, sha256, file_name)
                .await
            {
                Ok(bytes) => return Ok(bytes),
                Err(RtrError::UnknownFile) => {
                    // Ingestion still running; keep polling.
                    tokio::time::sleep(CONTENT_POLL_INTERVAL).await;
                }
                Err(err) => {
                    return Err(EngineError::TransferFailed(format!(
                        "content fetch for {remote_path}: {err}"
                    )));
                }
            }
        }
    }
}

/// Upload `bytes` under `name` in the tenant's put-file repository.
///
/// Names are unique per tenant, so this is list → match → delete → create.
pub async fn ensure_put_file<C: CloudClient>(
    client: &C,
    name: &str,
    bytes: Vec<u8>,
    comment: &str,
    description: &str,
) -> Result<(), EngineError> {
    let ids = client.list_put_files().await?;
    if !ids.is_empty() {
        let files = client.get_put_files(&ids).await?;
        if let Some(existing) = files.iter().find(|f| f.name == name) {
            tracing::info!(name, id = %existing.id, "replacing existing put-file");
            client.delete_put_file(&existing.id).await?;
        }
    }
    client
        .create_put_file(name, bytes, comment, description)
        .await?;
    tracing::info!(name, "put-file uploaded");
    Ok(())
}

/// True when the repository currently has a file named `name`.
pub async fn put_file_exists<C: CloudClient>(client: &C, name: &str) -> Result<bool, EngineError> {
    let ids = client.list_put_files().await?;
    if ids.is_empty() {
        return Ok(false);
    }
    let files = client.get_put_files(&ids).await?;
    Ok(files.iter().any(|f| f.name == name))
}

fn remote_file_name(remote_path: &str) -> String {
    remote_path
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("unknown_file")
        .to_string()
}

/// Write fully, verify the on-disk size, then move into place.
async fn write_verified(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let partial = path.with_extension("7z.part");
    tokio::fs::write(&partial, bytes).await?;
    let written = tokio::fs::metadata(&partial).await?.len();
    if written != bytes.len() as u64 {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(EngineError::TransferFailed(format!(
            "size mismatch writing {}: wrote {written} of {} bytes",
            path.display(),
            bytes.len()
        )));
    }
    tokio::fs::rename(&partial, path).await?;
    Ok(())
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
