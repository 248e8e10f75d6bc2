// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Windows collection via KAPE.
//!
//! Deploys the packaged tool through the put-file repository, launches it
//! with the bundled PowerShell script, supervises it by process presence,
//! then evacuates the archive by remote PUT or control-plane pull. The
//! workspace is removed and the session closed on every exit path.

use crate::cleanup::CleanupEngine;
use crate::error::EngineError;
use crate::orchestrator::{CollectionOutcome, EvacuationMode};
use crate::remote::windows;
use crate::session::{AgentGate, PulseTracker, SessionManager};
use crate::transfer::FileTransfer;
use crate::upload;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use triage_adapters::{CloudClient, ObjectStore};
use triage_config::Config;
use triage_core::{KapeArtifact, Platform, Session, WorkspacePaths};

const LAUNCH_SETTLE: Duration = Duration::from_secs(3);
const STABILITY_SAMPLE_GAP: Duration = Duration::from_secs(10);
const STABILITY_BUDGET: Duration = Duration::from_secs(600);
const UPLOAD_POLL: Duration = Duration::from_secs(10);
const UPLOAD_FINALIZE_WAIT: Duration = Duration::from_secs(30);
const PRESIGN_EXPIRY: Duration = Duration::from_secs(3_600);

/// KAPE collection pipeline for one Windows host.
pub struct KapeCollector<C: CloudClient, S: ObjectStore> {
    sessions: SessionManager<C>,
    transfer: FileTransfer<C>,
    cleanup: CleanupEngine<C>,
    store: S,
    config: Arc<Config>,
}

impl<C: CloudClient, S: ObjectStore> KapeCollector<C, S> {
    /// `gate` serializes sessions per agent; share one across every
    /// collector in the process.
    pub fn new(client: C, store: S, config: Arc<Config>, gate: AgentGate) -> Self {
        let sessions = SessionManager::new(client, &config.timeouts).with_gate(gate);
        Self {
            transfer: FileTransfer::new(sessions.clone(), &config.timeouts),
            cleanup: CleanupEngine::new(sessions.clone()),
            sessions,
            store,
            config,
        }
    }

    /// Run a full collection. `local_dir` receives the archive in
    /// download mode.
    pub async fn run(
        &self,
        host: &triage_core::HostInfo,
        target: &str,
        mode: EvacuationMode,
        local_dir: &Path,
    ) -> Result<CollectionOutcome, EngineError> {
        if host.platform != Platform::Windows {
            return Err(EngineError::PreconditionFailed(format!(
                "kape requires a windows host, {} is {}",
                host.hostname, host.platform
            )));
        }
        let ws = self.config.workspace_for(Platform::Windows);
        let mut session = self.sessions.start(&host.aid).await?;

        let result = self
            .collect(&mut session, host, target, mode, local_dir, &ws)
            .await;

        if let Err(err) = self.cleanup.cleanup_after(&mut session, &ws).await {
            tracing::warn!(hostname = %host.hostname, error = %err, "post-collection cleanup failed, escalating");
            self.cleanup.emergency(&mut session, &ws).await;
        }
        if let Err(err) = self.sessions.end(session).await {
            tracing::warn!(hostname = %host.hostname, error = %err, "session close failed");
        }
        // A lost session cannot have removed the workspace; retry the
        // emergency pass on a fresh one now that the agent slot is free.
        if matches!(result, Err(EngineError::SessionLost(_))) {
            self.cleanup.emergency_fresh_session(&host.aid, &ws).await;
        }
        result
    }

    async fn collect(
        &self,
        session: &mut Session,
        host: &triage_core::HostInfo,
        target: &str,
        mode: EvacuationMode,
        local_dir: &Path,
        ws: &WorkspacePaths,
    ) -> Result<CollectionOutcome, EngineError> {
        self.cleanup.ensure_clean(session, ws).await?;

        self.sessions
            .execute(session, "cd", &format!("cd {}", ws.base()), true)
            .await?;
        self.sessions
            .execute(session, "mkdir", "mkdir temp", true)
            .await?;

        self.sessions
            .execute(session, "put", "put kape.zip", true)
            .await?;
        self.sessions
            .execute(session, "put", "put deploy_kape.ps1", true)
            .await?;

        let deploy = self
            .sessions
            .execute(
                session,
                "runscript",
                &windows::run_deploy_script(&ws.join("deploy_kape.ps1")),
                true,
            )
            .await?;
        if !deploy.stderr.is_empty() {
            tracing::warn!(stderr = %deploy.stderr, "deploy script reported errors");
        }

        tokio::time::sleep(LAUNCH_SETTLE).await;
        let ps = self.sessions.execute(session, "ps", "ps", true).await?;
        if !ps.stdout.contains("kape.exe") {
            self.dump_launch_diagnostics(session, ws).await;
            return Err(EngineError::CollectorFailed(format!(
                "kape did not start on {}",
                host.hostname
            )));
        }
        tracing::info!(hostname = %host.hostname, target, "kape execution started");

        self.monitor(session, host, target).await?;

        let listing = self
            .sessions
            .execute(
                session,
                "runscript",
                &format!("ls {}\\", ws.output_dir()),
                false,
            )
            .await?;
        let Some(artifact) = KapeArtifact::find_in_listing(&listing.stdout) else {
            tracing::error!(listing = %listing.stdout, "no kape archive in output directory");
            return Err(EngineError::CollectorFailed(format!(
                "no archive produced on {}",
                host.hostname
            )));
        };
        tracing::info!(artifact = %artifact.base_name, "kape collection completed");

        match mode {
            EvacuationMode::Upload => self.evacuate_upload(session, host, ws, &artifact).await,
            EvacuationMode::Download => {
                self.evacuate_download(session, host, ws, &artifact, local_dir)
                    .await
            }
        }
    }

    async fn dump_launch_diagnostics(&self, session: &mut Session, ws: &WorkspacePaths) {
        if let Ok(listing) = self
            .sessions
            .execute(session, "runscript", &windows::list_directory(ws.base()), true)
            .await
        {
            tracing::info!(contents = %listing.stdout, "workspace contents after failed launch");
        }
        if let Ok(cli) = self
            .sessions
            .execute(
                session,
                "runscript",
                &windows::read_file(&ws.join("_kape.cli")),
                true,
            )
            .await
        {
            tracing::info!(cli = %cli.stdout, "kape cli file contents");
        }
    }

    /// Watch the process list until `kape.exe` disappears.
    async fn monitor(
        &self,
        session: &mut Session,
        host: &triage_core::HostInfo,
        target: &str,
    ) -> Result<(), EngineError> {
        let budget = self.config.kape.target_timeout(target);
        let interval = self.config.kape.monitoring_interval();
        let started = Instant::now();
        let mut tracker = PulseTracker::new();
        loop {
            if started.elapsed() > budget {
                return Err(EngineError::CollectorFailed(format!(
                    "kape on {} exceeded {}s budget for {target}",
                    host.hostname,
                    budget.as_secs()
                )));
            }
            tracker.tick(&self.sessions, session).await?;
            let ps = self.sessions.execute(session, "ps", "ps", true).await?;
            if !ps.stdout.contains("kape.exe") {
                tracing::info!(
                    hostname = %host.hostname,
                    elapsed_secs = started.elapsed().as_secs(),
                    "kape execution finished"
                );
                return Ok(());
            }
            tracing::debug!(
                hostname = %host.hostname,
                elapsed_secs = started.elapsed().as_secs(),
                "kape still running"
            );
            tokio::time::sleep(interval).await;
        }
    }

    /// Wait until the archive size is unchanged across two samples.
    async fn wait_for_stable_size(
        &self,
        session: &mut Session,
        path: &str,
    ) -> Result<u64, EngineError> {
        let started = Instant::now();
        let mut tracker = PulseTracker::new();
        let mut last: Option<u64> = None;
        loop {
            if started.elapsed() > STABILITY_BUDGET {
                return Err(EngineError::CollectorFailed(format!(
                    "{path} never reached a stable size"
                )));
            }
            tracker.tick(&self.sessions, session).await?;
            let result = self
                .sessions
                .execute(session, "runscript", &windows::file_length(path), true)
                .await?;
            let size = result.stdout_trimmed().parse::<u64>().ok();
            match (last, size) {
                (Some(previous), Some(current)) if previous == current && current > 0 => {
                    return Ok(current);
                }
                _ => last = size,
            }
            tokio::time::sleep(STABILITY_SAMPLE_GAP).await;
        }
    }

    async fn evacuate_upload(
        &self,
        session: &mut Session,
        host: &triage_core::HostInfo,
        ws: &WorkspacePaths,
        artifact: &KapeArtifact,
    ) -> Result<CollectionOutcome, EngineError> {
        let zip_path = ws.output_file(&artifact.zip_name());
        let size = self.wait_for_stable_size(session, &zip_path).await?;
        tracing::info!(size, "archive stable, starting upload");

        let key = artifact.evacuation_name();
        let mut url = self.store.presign_put(&key, PRESIGN_EXPIRY).await?;
        if self.config.proxy.enabled {
            url = upload::rewrite_presigned_host(&url, &self.config.proxy.host)?;
        }
        if let Some(hosts_cmd) = windows::add_host_entries(&self.config.effective_host_entries()) {
            self.sessions
                .execute(session, "runscript", &hosts_cmd, true)
                .await?;
        }

        self.sessions
            .execute(session, "runscript", &windows::start_upload(&zip_path, &url), true)
            .await?;
        tracing::info!(key = %key, "background upload launched");

        let budget = upload::windows_upload_budget(size);
        let started = Instant::now();
        let mut tracker = PulseTracker::new();
        loop {
            if started.elapsed() > budget {
                tracing::warn!(
                    budget_secs = budget.as_secs(),
                    "upload supervision budget exhausted, deferring to head check"
                );
                break;
            }
            tracker.tick(&self.sessions, session).await?;
            let count = self
                .sessions
                .execute(session, "runscript", &windows::count_upload_processes(), true)
                .await?;
            if count.stdout_trimmed().parse::<u32>() == Ok(0) {
                tracing::info!("upload process exited");
                tokio::time::sleep(UPLOAD_FINALIZE_WAIT).await;
                break;
            }
            tokio::time::sleep(UPLOAD_POLL).await;
        }

        let object_size = upload::verify_uploaded(&self.store, &key, Some(size)).await?;
        Ok(CollectionOutcome {
            hostname: host.hostname.clone(),
            artifact: key.clone(),
            size: object_size,
            destination: format!("s3://{}/{key}", self.store.bucket()),
        })
    }

    async fn evacuate_download(
        &self,
        session: &mut Session,
        host: &triage_core::HostInfo,
        ws: &WorkspacePaths,
        artifact: &KapeArtifact,
        local_dir: &Path,
    ) -> Result<CollectionOutcome, EngineError> {
        let remote = ws.output_file(&artifact.zip_name());
        let size_result = self
            .sessions
            .execute(session, "runscript", &windows::file_length(&remote), true)
            .await?;
        let expected = size_result.stdout_trimmed().parse::<u64>().ok();

        let path = self
            .transfer
            .download(session, &remote, local_dir, expected)
            .await?;
        let written = tokio::fs::metadata(&path).await?.len();
        if !triage_adapters::s3::size_matches(written, expected) {
            return Err(EngineError::TransferFailed(format!(
                "{}: local size {written} does not match remote {expected:?}",
                path.display()
            )));
        }
        Ok(CollectionOutcome {
            hostname: host.hostname.clone(),
            artifact: artifact.evacuation_name(),
            size: written,
            destination: path.display().to_string(),
        })
    }
}

#[cfg(test)]
#[path = "kape_tests.rs"]
mod tests;
