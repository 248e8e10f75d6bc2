// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RTR session lifecycle and command execution.
//!
//! The control plane expires a session after ~10 minutes of inactivity.
//! Commands themselves count as activity; anything that waits longer than
//! 5 minutes between commands must interleave keepalive pulses via
//! [`PulseTracker`].

use crate::error::EngineError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use triage_adapters::{CloudClient, RtrError};
use triage_config::Timeouts;
use triage_core::{CommandResult, Session};

/// Seconds between status polls for a submitted command.
const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Keepalive cadence, half the control plane's inactivity deadline.
pub(crate) const PULSE_INTERVAL: Duration = Duration::from_secs(300);

/// Serializes sessions per agent: a second collection against the same
/// agent-id waits until the first closes its session. Share one gate
/// across every manager that can reach the same fleet.
#[derive(Clone, Default)]
pub struct AgentGate {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    held: Arc<Mutex<HashMap<String, OwnedMutexGuard<()>>>>,
}

impl AgentGate {
    async fn acquire(&self, device_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(device_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    fn register(&self, session_id: &str, guard: OwnedMutexGuard<()>) {
        self.held.lock().insert(session_id.to_string(), guard);
    }

    fn release(&self, session_id: &str) -> Option<OwnedMutexGuard<()>> {
        self.held.lock().remove(session_id)
    }
}

/// Per-agent session lifecycle: open, execute with polling, pulse, close.
#[derive(Clone)]
pub struct SessionManager<C: CloudClient> {
    client: C,
    command_timeout: Duration,
    gate: AgentGate,
}

impl<C: CloudClient> SessionManager<C> {
    pub fn new(client: C, timeouts: &Timeouts) -> Self {
        Self {
            client,
            command_timeout: timeouts.command_execution(),
            gate: AgentGate::default(),
        }
    }

    /// Replace the per-agent gate, normally with one shared process-wide.
    pub fn with_gate(mut self, gate: AgentGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Open a session. The init response must report the session as
    /// created and carry a session id. Waits for any other open session
    /// against the same agent to close first.
    pub async fn start(&self, device_id: &str) -> Result<Session, EngineError> {
        let guard = self.gate.acquire(device_id).await;
        let handle = self.client.init_session(device_id).await?;
        if !handle.created || handle.session_id.is_empty() {
            return Err(EngineError::SessionLost(format!(
                "init for {device_id} did not yield a created session"
            )));
        }
        tracing::info!(device_id, session_id = %handle.session_id, "session opened");
        self.gate.register(&handle.session_id, guard);
        Ok(Session::new(
            handle.session_id,
            device_id.to_string(),
            handle.raw,
        ))
    }

    /// Submit a command and poll its status until completion or the
    /// command deadline.
    pub async fn execute(
        &self,
        session: &mut Session,
        base_command: &str,
        command_string: &str,
        admin: bool,
    ) -> Result<CommandResult, EngineError> {
        self.execute_with_timeout(session, base_command, command_string, admin, self.command_timeout)
            .await
    }

    /// Like [`execute`](Self::execute) with an explicit deadline, used by
    /// size-aware transfer phases.
    pub async fn execute_with_timeout(
        &self,
        session: &mut Session,
        base_command: &str,
        command_string: &str,
        admin: bool,
        timeout: Duration,
    ) -> Result<CommandResult, EngineError> {
        let cloud_request_id = if admin {
            self.client
                .execute_admin_command(&session.session_id, base_command, command_string)
                .await?
        } else {
            self.client
                .execute_command(&session.session_id, base_command, command_string)
                .await?
        };
        tracing::debug!(
            session_id = %session.session_id,
            base_command,
            %cloud_request_id,
            "command submitted"
        );

        let started = Instant::now();
        loop {
            let status = if admin {
                self.client
                    .check_admin_command_status(&cloud_request_id, 0)
                    .await?
            } else {
                self.client
                    .check_command_status(&cloud_request_id, 0)
                    .await?
            };
            if status.complete {
                if !status.stderr.is_empty() {
                    tracing::debug!(
                        base_command,
                        stderr = %status.stderr,
                        "command completed with stderr"
                    );
                }
                session.mark_pulsed();
                return Ok(CommandResult {
                    return_code: i32::from(!status.stderr.is_empty()),
                    stdout: status.stdout,
                    stderr: status.stderr,
                    cloud_request_id,
                    complete: true,
                });
            }
            if started.elapsed() > timeout {
                return Err(EngineError::CommandTimeout {
                    context: format!("{base_command} {command_string}"),
                    elapsed: started.elapsed(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Execute and require an empty stderr.
    pub async fn execute_expect_clean(
        &self,
        session: &mut Session,
        base_command: &str,
        command_string: &str,
        admin: bool,
    ) -> Result<CommandResult, EngineError> {
        let result = self
            .execute(session, base_command, command_string, admin)
            .await?;
        if !result.stderr.is_empty() {
            return Err(EngineError::RemoteError {
                stderr: result.stderr,
            });
        }
        Ok(result)
    }

    /// Refresh the keepalive. A failed pulse means the session is likely
    /// gone; callers must not fabricate results past this point.
    pub async fn pulse(&self, session: &mut Session) -> Result<(), EngineError> {
        match self.client.pulse_session(&session.device_id).await {
            Ok(()) => {
                session.mark_pulsed();
                Ok(())
            }
            Err(err) => Err(EngineError::SessionLost(format!(
                "pulse for {} failed: {err}",
                session.device_id
            ))),
        }
    }

    /// Delete the session. Invoked on every exit path of a collection.
    /// Frees the agent's slot even when the delete call itself fails.
    pub async fn end(&self, session: Session) -> Result<(), EngineError> {
        let _slot = self.gate.release(&session.session_id);
        match self.client.delete_session(&session.session_id).await {
            Ok(()) => {
                tracing::info!(session_id = %session.session_id, "session closed");
                Ok(())
            }
            Err(RtrError::Api { code: 404, .. }) => {
                // Already expired server-side; the invariant is satisfied.
                tracing::debug!(session_id = %session.session_id, "session already gone");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Interleaves keepalives into long waits.
///
/// Tracks its own clock rather than the session's so that phases can
/// overlap without double-pulsing.
pub struct PulseTracker {
    interval: Duration,
    last: Instant,
}

impl Default for PulseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseTracker {
    pub fn new() -> Self {
        Self {
            interval: PULSE_INTERVAL,
            last: Instant::now(),
        }
    }

    /// Pulse when the cadence is due. Errors propagate as `SessionLost`.
    pub async fn tick<C: CloudClient>(
        &mut self,
        sessions: &SessionManager<C>,
        session: &mut Session,
    ) -> Result<(), EngineError> {
        if self.last.elapsed() < self.interval {
            return Ok(());
        }
        sessions.pulse(session).await?;
        tracing::debug!(session_id = %session.session_id, "session pulsed");
        self.last = Instant::now();
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
