// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix collection via UAC.
//!
//! UAC runs for hours while the RTR channel stays synchronous, so the
//! collector is launched in a detached subshell and supervised through
//! its pid / log / exit-code file triplet plus the evidence directory.
//! Uploads follow the same triplet discipline with `curl`; the session is
//! recreated up to three times if it dies mid-supervision, and HEAD on
//! the destination object is the only authoritative upload verdict.

use crate::cleanup::CleanupEngine;
use crate::error::EngineError;
use crate::orchestrator::{CollectionOutcome, EvacuationMode};
use crate::remote::unix;
use crate::session::{AgentGate, PulseTracker, SessionManager};
use crate::transfer::FileTransfer;
use crate::upload;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use triage_adapters::{CloudClient, ObjectStore};
use triage_config::Config;
use triage_core::{Session, UacArtifact, WorkspacePaths};

const LAUNCH_SETTLE: Duration = Duration::from_secs(3);
const STABILITY_SAMPLE_GAP: Duration = Duration::from_secs(10);
const STABILITY_BUDGET: Duration = Duration::from_secs(300);
/// Grace period for the archive to appear after the exit-code file does.
const EXIT_WITHOUT_ARCHIVE_GRACE: Duration = Duration::from_secs(900);
/// Budget extension granted when the deadline passes with a live pid.
const LIVE_PID_EXTENSION: Duration = Duration::from_secs(1_800);
const MAX_EXTENSIONS: u32 = 4;
const UPLOAD_POLL: Duration = Duration::from_secs(10);
const UPLOAD_FINALIZE_WAIT: Duration = Duration::from_secs(30);
const PRESIGN_EXPIRY: Duration = Duration::from_secs(3_600);
const MAX_SESSION_RECREATIONS: u32 = 3;

/// UAC collection pipeline for one macOS or Linux host.
pub struct UacCollector<C: CloudClient, S: ObjectStore> {
    sessions: SessionManager<C>,
    transfer: FileTransfer<C>,
    cleanup: CleanupEngine<C>,
    store: S,
    config: Arc<Config>,
}

impl<C: CloudClient, S: ObjectStore> UacCollector<C, S> {
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
        profile: &str,
        mode: EvacuationMode,
        local_dir: &Path,
    ) -> Result<CollectionOutcome, EngineError> {
        if !host.platform.is_unix() {
            return Err(EngineError::PreconditionFailed(format!(
                "uac requires a unix host, {} is {}",
                host.hostname, host.platform
            )));
        }
        let ws = self.config.workspace_for(host.platform);
        let mut session = self.sessions.start(&host.aid).await?;

        let result = self
            .collect(&mut session, host, profile, mode, local_dir, &ws)
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
        profile: &str,
        mode: EvacuationMode,
        local_dir: &Path,
        ws: &WorkspacePaths,
    ) -> Result<CollectionOutcome, EngineError> {
        self.cleanup.ensure_clean(session, ws).await?;

        self.sessions
            .execute(session, "cd", &format!("cd {}", ws.base()), true)
            .await?;
        let pwd = self.sessions.execute(session, "pwd", "pwd", true).await?;
        if !pwd.stdout.contains(ws.base()) {
            return Err(EngineError::CollectorFailed(format!(
                "workspace cd verification failed, pwd reported {:?}",
                pwd.stdout_trimmed()
            )));
        }

        self.sessions
            .execute(session, "put", "put uac.zip", true)
            .await?;
        self.sessions
            .execute(
                session,
                "runscript",
                &unix::unzip_package(ws.base(), "uac.zip"),
                true,
            )
            .await?;

        let found = self
            .sessions
            .execute(session, "runscript", &unix::find_uac_dir(ws.base()), true)
            .await?;
        let uac_dir = found.stdout_trimmed().lines().next().unwrap_or("").to_string();
        if uac_dir.is_empty() {
            return Err(EngineError::CollectorFailed(
                "no uac directory after extraction".to_string(),
            ));
        }
        self.sessions
            .execute(
                session,
                "runscript",
                &unix::chmod_executable(&format!("{uac_dir}/uac")),
                true,
            )
            .await?;

        self.sessions
            .execute(
                session,
                "runscript",
                &unix::launch_uac(&uac_dir, profile, ws.base()),
                true,
            )
            .await?;
        tokio::time::sleep(LAUNCH_SETTLE).await;
        let pid = self
            .sessions
            .execute(session, "runscript", &unix::read_pid_file(ws.base()), true)
            .await?;
        if pid.stdout_trimmed().is_empty() {
            return Err(EngineError::CollectorFailed(format!(
                "uac launcher left no pid file on {}",
                host.hostname
            )));
        }
        // The recorded pid is the subshell's and may exit quickly; the
        // log and evidence directory are the real progress signals.
        tracing::info!(hostname = %host.hostname, profile, pid = %pid.stdout_trimmed(), "uac started in background");

        let artifact = self.monitor(session, host, profile, ws).await?;
        tracing::info!(artifact = %artifact.base_name, "uac collection completed");

        match mode {
            EvacuationMode::Upload => self.evacuate_upload(session, host, ws, &artifact).await,
            EvacuationMode::Download => {
                self.evacuate_download(session, host, ws, &artifact, local_dir)
                    .await
            }
        }
    }

    /// Supervise the collector through its log, the evidence directory,
    /// and the exit-code file.
    async fn monitor(
        &self,
        session: &mut Session,
        host: &triage_core::HostInfo,
        profile: &str,
        ws: &WorkspacePaths,
    ) -> Result<UacArtifact, EngineError> {
        let interval = self.config.uac.monitoring_interval();
        let mut deadline = Instant::now() + self.config.uac.profile_timeout(profile);
        let mut extensions = 0u32;
        let mut exit_seen_at: Option<Instant> = None;
        let mut tracker = PulseTracker::new();

        loop {
            tracker.tick(&self.sessions, session).await?;

            let tail = self
                .sessions
                .execute(session, "runscript", &unix::tail_log(ws.base(), 10), true)
                .await?;
            log_uac_progress(&tail.stdout);

            let listing = self
                .sessions
                .execute(
                    session,
                    "runscript",
                    &unix::list_directory(&ws.output_dir()),
                    true,
                )
                .await?;
            if let Some(artifact) = UacArtifact::find_in_listing(&listing.stdout, &host.hostname) {
                self.wait_for_stable_size(session, &ws.output_file(&artifact.tar_name()))
                    .await?;
                return Ok(artifact);
            }

            let exit = self
                .sessions
                .execute(session, "runscript", &unix::read_exit_code(ws.base()), true)
                .await?;
            if let Ok(code) = exit.stdout_trimmed().parse::<i32>() {
                // Completed without a final archive: give the archiver a
                // grace window, then give up.
                let seen = *exit_seen_at.get_or_insert_with(Instant::now);
                if seen.elapsed() > EXIT_WITHOUT_ARCHIVE_GRACE {
                    return Err(EngineError::CollectorFailed(format!(
                        "uac exited with code {code} and no archive appeared on {}",
                        host.hostname
                    )));
                }
                tracing::warn!(code, "uac exited before archive was found, waiting");
            }

            if Instant::now() > deadline {
                if extensions < MAX_EXTENSIONS && self.collector_pid_alive(session, ws).await? {
                    extensions += 1;
                    deadline = Instant::now() + LIVE_PID_EXTENSION;
                    tracing::warn!(
                        extensions,
                        "profile budget exceeded but uac is still running, extending"
                    );
                } else {
                    return Err(EngineError::CollectorFailed(format!(
                        "uac on {} exceeded the {profile} monitoring budget",
                        host.hostname
                    )));
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn collector_pid_alive(
        &self,
        session: &mut Session,
        ws: &WorkspacePaths,
    ) -> Result<bool, EngineError> {
        let pid = self
            .sessions
            .execute(session, "runscript", &unix::read_pid_file(ws.base()), true)
            .await?;
        let pid = pid.stdout_trimmed().to_string();
        if pid.is_empty() {
            return Ok(false);
        }
        let alive = self
            .sessions
            .execute(session, "runscript", &unix::process_alive(&pid), true)
            .await?;
        Ok(!alive.stdout_trimmed().is_empty())
    }

    /// Size unchanged across two consecutive samples at least 10 s apart.
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
                .execute(session, "runscript", &unix::file_size(path), true)
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

    /// Replace a dead session, keeping the one-end-per-start invariant.
    async fn recreate_session(
        &self,
        session: &mut Session,
        host: &triage_core::HostInfo,
        recreations: &mut u32,
    ) -> Result<(), EngineError> {
        if *recreations >= MAX_SESSION_RECREATIONS {
            return Err(EngineError::SessionLost(format!(
                "session for {} lost after {MAX_SESSION_RECREATIONS} recreations",
                host.hostname
            )));
        }
        *recreations += 1;
        tracing::warn!(
            hostname = %host.hostname,
            attempt = *recreations,
            "session lost mid-supervision, recreating"
        );
        // End first: the dead session still holds the agent's slot.
        let dead = session.clone();
        let _ = self.sessions.end(dead).await;
        *session = self.sessions.start(&host.aid).await?;
        Ok(())
    }

    async fn evacuate_upload(
        &self,
        session: &mut Session,
        host: &triage_core::HostInfo,
        ws: &WorkspacePaths,
        artifact: &UacArtifact,
    ) -> Result<CollectionOutcome, EngineError> {
        let tar_path = ws.output_file(&artifact.tar_name());
        let size = self.wait_for_stable_size(session, &tar_path).await?;
        tracing::info!(size, "archive stable, starting upload");

        let key = artifact.evacuation_name();
        let mut url = self.store.presign_put(&key, PRESIGN_EXPIRY).await?;
        if self.config.proxy.enabled {
            url = upload::rewrite_presigned_host(&url, &self.config.proxy.host)?;
        }
        if let Some(hosts_cmd) = unix::add_host_entries(&self.config.effective_host_entries()) {
            self.sessions
                .execute(session, "runscript", &hosts_cmd, true)
                .await?;
        }

        // Capped by the configured upload ceiling, not the profile's
        // monitoring budget: collection time and egress time are
        // unrelated.
        let budget = upload::unix_upload_budget(size, self.config.timeouts.upload());
        let evidence = ws.output_dir();
        self.sessions
            .execute(
                session,
                "runscript",
                &unix::start_upload(&tar_path, &url, &evidence, budget.as_secs()),
                true,
            )
            .await?;
        tracing::info!(key = %key, budget_secs = budget.as_secs(), "background upload launched");

        self.supervise_upload(session, host, &evidence, budget).await;

        tokio::time::sleep(UPLOAD_FINALIZE_WAIT).await;
        let object_size = upload::verify_uploaded(&self.store, &key, Some(size)).await?;
        Ok(CollectionOutcome {
            hostname: host.hostname.clone(),
            artifact: key.clone(),
            size: object_size,
            destination: format!("s3://{}/{key}", self.store.bucket()),
        })
    }

    /// Watch the upload triplet until completion or budget exhaustion.
    ///
    /// Never returns an error: the remote exit code and process state are
    /// advisory, and a session that cannot be recreated simply ends the
    /// watch early. HEAD on the destination object decides.
    async fn supervise_upload(
        &self,
        session: &mut Session,
        host: &triage_core::HostInfo,
        evidence: &str,
        budget: Duration,
    ) {
        let started = Instant::now();
        let mut tracker = PulseTracker::new();
        let mut recreations = 0u32;
        // Slack past the curl --max-time so the exit code can land.
        let watch_limit = budget + Duration::from_secs(60);

        loop {
            if started.elapsed() > watch_limit {
                tracing::warn!("upload supervision budget exhausted, deferring to head check");
                return;
            }
            let step = self
                .upload_watch_step(session, &mut tracker, evidence)
                .await;
            match step {
                Ok(true) => return,
                Ok(false) => tokio::time::sleep(UPLOAD_POLL).await,
                Err(err) => {
                    tracing::warn!(error = %err, "upload supervision step failed");
                    if self
                        .recreate_session(session, host, &mut recreations)
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }

    /// One supervision pass; `Ok(true)` when the upload is finished.
    async fn upload_watch_step(
        &self,
        session: &mut Session,
        tracker: &mut PulseTracker,
        evidence: &str,
    ) -> Result<bool, EngineError> {
        tracker.tick(&self.sessions, session).await?;

        let progress = self
            .sessions
            .execute(session, "runscript", &unix::upload_progress(evidence), true)
            .await?;
        let latest = progress.stdout_trimmed();
        if !latest.is_empty() {
            tracing::info!(progress = %latest, "upload progress");
            if latest.starts_with("100.0%") || latest == "100%" {
                return Ok(true);
            }
        }

        let exit = self
            .sessions
            .execute(
                session,
                "runscript",
                &unix::read_upload_exit_code(evidence),
                true,
            )
            .await?;
        if let Ok(code) = exit.stdout_trimmed().parse::<i32>() {
            if code == 0 {
                tracing::info!("upload process exited cleanly");
            } else {
                // Advisory only; proxies and TLS quirks produce bogus
                // non-zero exits for uploads that actually landed.
                tracing::warn!(code, "upload process exited non-zero");
            }
            return Ok(true);
        }

        let pid = self
            .sessions
            .execute(session, "runscript", &unix::read_upload_pid(evidence), true)
            .await?;
        let pid = pid.stdout_trimmed().to_string();
        if !pid.is_empty() {
            let alive = self
                .sessions
                .execute(session, "runscript", &unix::process_alive(&pid), true)
                .await?;
            if alive.stdout_trimmed().is_empty() {
                tracing::info!("upload process no longer present");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn evacuate_download(
        &self,
        session: &mut Session,
        host: &triage_core::HostInfo,
        ws: &WorkspacePaths,
        artifact: &UacArtifact,
        local_dir: &Path,
    ) -> Result<CollectionOutcome, EngineError> {
        let remote = ws.output_file(&artifact.tar_name());
        let size_result = self
            .sessions
            .execute(session, "runscript", &unix::file_size(&remote), true)
            .await?;
        let expected = size_result.stdout_trimmed().parse::<u64>().ok();

        let path = self
            .transfer
            .download(session, &remote, local_dir, expected)
            .await?;
        let written = tokio::fs::metadata(&path).await?.len();
        Ok(CollectionOutcome {
            hostname: host.hostname.clone(),
            artifact: artifact.evacuation_name(),
            size: written,
            destination: path.display().to_string(),
        })
    }
}

/// Surface `[n/m] artifact` progress lines; keep known benign validation
/// noise off the console.
fn log_uac_progress(tail: &str) {
    let Ok(progress) = Regex::new(r"\[(\d+)/(\d+)\]") else {
        return;
    };
    for line in tail.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "Log file not found" {
            continue;
        }
        if trimmed.contains("__EOF__") && trimmed.contains("artifact not found") {
            tracing::debug!(line = trimmed, "benign uac validation notice");
            continue;
        }
        if let Some(caps) = progress.captures(trimmed) {
            tracing::info!(current = &caps[1], total = &caps[2], line = trimmed, "uac progress");
        }
    }
}

#[cfg(test)]
#[path = "uac_tests.rs"]
mod tests;
