// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre/post collection cleanup.
//!
//! A collection must never run into a dirty workspace: leftover collector
//! processes are terminated and the deploy directory is recreated empty
//! before deploy, and removed again on every exit path. When the normal
//! post-cleanup fails, an emergency pass ignores individual command
//! failures and may run on a freshly opened session.

use crate::error::EngineError;
use crate::remote::{unix, windows, RemoteProcess};
use crate::session::SessionManager;
use std::time::Duration;
use tokio::time::Instant;
use triage_adapters::CloudClient;
use triage_core::{Platform, Session, WorkspacePaths};

/// Command-line tokens identifying the orchestrator's own activity on the
/// endpoint (the RTR script shims and the sweep pipeline itself); the
/// sweep must not kill these. Deliberately narrow: collector command
/// lines contain profile names like `ir_triage`, so product-name tokens
/// would exempt the very processes the sweep exists to kill.
const ORCHESTRATOR_TOKENS: &[&str] = &["runscript", "grep -E", "falconpy"];

const WINDOWS_PROCESS_PATTERNS: &[&str] = &["kape.exe", "powershell.*KAPE"];

const TERMINATION_WAIT: Duration = Duration::from_secs(30);
const TERMINATION_POLL: Duration = Duration::from_secs(2);
// A prior root-owned delete can still be draining in the kernel when the
// directory is recreated; the settle sleep closes that race.
const WORKSPACE_SETTLE: Duration = Duration::from_secs(8);
const FALLBACK_SETTLE: Duration = Duration::from_secs(2);

fn unix_process_patterns(workspace: &str) -> Vec<String> {
    vec![
        format!("{workspace}/uac-main/uac"),
        "./uac ".to_string(),
        "curl .*amazonaws.*uac-".to_string(),
    ]
}

/// Workspace and process hygiene around a collection.
#[derive(Clone)]
pub struct CleanupEngine<C: CloudClient> {
    sessions: SessionManager<C>,
}

impl<C: CloudClient> CleanupEngine<C> {
    pub fn new(sessions: SessionManager<C>) -> Self {
        Self { sessions }
    }

    /// Gate before deploy: sweep and kill stale collectors, then recreate
    /// the workspace empty. Any failure is `PreconditionFailed`.
    pub async fn ensure_clean(
        &self,
        session: &mut Session,
        ws: &WorkspacePaths,
    ) -> Result<(), EngineError> {
        let stale = self.sweep(session, ws).await?;
        if !stale.is_empty() {
            tracing::warn!(count = stale.len(), "terminating stale collector processes");
            self.terminate(session, ws, &stale).await?;
        }

        if self.workspace_exists(session, ws).await? {
            tracing::info!(workspace = ws.base(), "removing existing workspace");
            self.remove_workspace(session, ws).await.map_err(|err| {
                EngineError::PreconditionFailed(format!(
                    "could not remove workspace {}: {err}",
                    ws.base()
                ))
            })?;
        }

        self.create_workspace(session, ws).await?;
        self.verify_empty(session, ws).await?;
        tracing::info!(workspace = ws.base(), "clean environment verified");
        Ok(())
    }

    /// Post-collection removal. The RTR working directory is moved out of
    /// the workspace first to release handles.
    pub async fn cleanup_after(
        &self,
        session: &mut Session,
        ws: &WorkspacePaths,
    ) -> Result<(), EngineError> {
        let cd_out = match ws.platform() {
            Platform::Windows => "cd C:\\",
            Platform::Mac | Platform::Linux => "cd /",
        };
        self.sessions
            .execute(session, "cd", cd_out, true)
            .await?;
        self.remove_workspace(session, ws).await?;
        tracing::info!(workspace = ws.base(), "workspace removed");
        Ok(())
    }

    /// Best-effort removal that ignores individual command failures.
    pub async fn emergency(&self, session: &mut Session, ws: &WorkspacePaths) {
        tracing::warn!(workspace = ws.base(), "running emergency cleanup");
        let cd_out = match ws.platform() {
            Platform::Windows => "cd C:\\",
            Platform::Mac | Platform::Linux => "cd /",
        };
        let _ = self.sessions.execute(session, "cd", cd_out, true).await;
        for command in Self::removal_chain(ws) {
            let _ = self
                .sessions
                .execute(session, "runscript", &command, true)
                .await;
        }
    }

    /// Emergency cleanup on a freshly opened session, for when the
    /// original session died with the workspace still on disk. The dead
    /// session must already be closed or the per-agent gate will park
    /// this open.
    pub async fn emergency_fresh_session(&self, device_id: &str, ws: &WorkspacePaths) {
        match self.sessions.start(device_id).await {
            Ok(mut session) => {
                self.emergency(&mut session, ws).await;
                let _ = self.sessions.end(session).await;
            }
            Err(err) => {
                tracing::error!(device_id, error = %err, "emergency cleanup could not open session");
            }
        }
    }

    /// Enumerate collector processes matching the platform patterns,
    /// excluding the orchestrator itself.
    async fn sweep(
        &self,
        session: &mut Session,
        ws: &WorkspacePaths,
    ) -> Result<Vec<RemoteProcess>, EngineError> {
        let mut found = Vec::new();
        match ws.platform() {
            Platform::Windows => {
                for pattern in WINDOWS_PROCESS_PATTERNS {
                    let result = self
                        .sessions
                        .execute(session, "runscript", &windows::process_sweep(pattern), true)
                        .await?;
                    found.extend(windows::parse_process_listing(&result.stdout));
                }
            }
            Platform::Mac | Platform::Linux => {
                for pattern in unix_process_patterns(ws.base()) {
                    let result = self
                        .sessions
                        .execute(session, "runscript", &unix::process_sweep(&pattern), true)
                        .await?;
                    found.extend(unix::parse_process_listing(&result.stdout));
                }
            }
        }
        found.retain(|p| !is_orchestrator_process(&p.command));
        found.dedup_by(|a, b| a.pid == b.pid);
        Ok(found)
    }

    async fn terminate(
        &self,
        session: &mut Session,
        ws: &WorkspacePaths,
        processes: &[RemoteProcess],
    ) -> Result<(), EngineError> {
        for process in processes {
            tracing::info!(pid = %process.pid, command = %process.command, "killing stale process");
            let kill = match ws.platform() {
                Platform::Windows => windows::kill_process(&process.pid),
                Platform::Mac | Platform::Linux => unix::kill_process(&process.pid),
            };
            let _ = self
                .sessions
                .execute(session, "runscript", &kill, true)
                .await;
        }

        let deadline = Instant::now() + TERMINATION_WAIT;
        loop {
            let remaining = self.sweep(session, ws).await?;
            if remaining.is_empty() {
                return Ok(());
            }
            if Instant::now() > deadline {
                return Err(EngineError::PreconditionFailed(format!(
                    "{} collector processes survived termination",
                    remaining.len()
                )));
            }
            tokio::time::sleep(TERMINATION_POLL).await;
        }
    }

    async fn workspace_exists(
        &self,
        session: &mut Session,
        ws: &WorkspacePaths,
    ) -> Result<bool, EngineError> {
        let (command, marker) = match ws.platform() {
            Platform::Windows => (windows::test_path(ws.base()), "True"),
            Platform::Mac | Platform::Linux => (unix::test_dir(ws.base()), "EXISTS"),
        };
        let result = self
            .sessions
            .execute(session, "runscript", &command, true)
            .await?;
        Ok(result.stdout.contains(marker))
    }

    fn removal_chain(ws: &WorkspacePaths) -> Vec<String> {
        match ws.platform() {
            Platform::Windows => vec![
                windows::remove_workspace(ws.base()),
                windows::remove_workspace_fallback(ws.base()),
                windows::remove_workspace_takeown(ws.base()),
            ],
            Platform::Mac | Platform::Linux => vec![
                unix::remove_workspace(ws.base()),
                unix::remove_workspace_fallback(ws.base()),
            ],
        }
    }

    /// Remove the workspace, escalating through the platform fallback
    /// chain until the directory is gone.
    async fn remove_workspace(
        &self,
        session: &mut Session,
        ws: &WorkspacePaths,
    ) -> Result<(), EngineError> {
        for (attempt, command) in Self::removal_chain(ws).iter().enumerate() {
            let _ = self
                .sessions
                .execute(session, "runscript", command, true)
                .await;
            let settle = if attempt == 0 {
                WORKSPACE_SETTLE
            } else {
                FALLBACK_SETTLE
            };
            tokio::time::sleep(settle).await;
            if !self.workspace_exists(session, ws).await? {
                return Ok(());
            }
            tracing::warn!(
                workspace = ws.base(),
                attempt = attempt + 1,
                "workspace still present after removal attempt"
            );
        }
        Err(EngineError::PreconditionFailed(format!(
            "workspace {} survived the removal chain",
            ws.base()
        )))
    }

    async fn create_workspace(
        &self,
        session: &mut Session,
        ws: &WorkspacePaths,
    ) -> Result<(), EngineError> {
        let command = match ws.platform() {
            Platform::Windows => windows::create_workspace(ws.base()),
            Platform::Mac | Platform::Linux => unix::create_workspace(ws.base()),
        };
        self.sessions
            .execute(session, "runscript", &command, true)
            .await?;
        tokio::time::sleep(WORKSPACE_SETTLE).await;
        if !self.workspace_exists(session, ws).await? {
            return Err(EngineError::PreconditionFailed(format!(
                "workspace {} missing after creation",
                ws.base()
            )));
        }
        Ok(())
    }

    async fn verify_empty(
        &self,
        session: &mut Session,
        ws: &WorkspacePaths,
    ) -> Result<(), EngineError> {
        let command = match ws.platform() {
            Platform::Windows => windows::count_entries(ws.base()),
            Platform::Mac | Platform::Linux => unix::count_entries(ws.base()),
        };
        let result = self
            .sessions
            .execute(session, "runscript", &command, true)
            .await?;
        let count: u32 = result.stdout_trimmed().parse().map_err(|_| {
            EngineError::PreconditionFailed(format!(
                "unreadable workspace entry count: {:?}",
                result.stdout_trimmed()
            ))
        })?;
        // `ls -la` emits the total line plus `.` and `..`.
        let empty = match ws.platform() {
            Platform::Windows => count == 0,
            Platform::Mac | Platform::Linux => count <= 3,
        };
        if !empty {
            return Err(EngineError::PreconditionFailed(format!(
                "workspace {} is not empty (count {count})",
                ws.base()
            )));
        }
        Ok(())
    }
}

/// Whether a command line belongs to the orchestrator's own tooling.
fn is_orchestrator_process(command: &str) -> bool {
    ORCHESTRATOR_TOKENS
        .iter()
        .any(|token| command.contains(token))
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
