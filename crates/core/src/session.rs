// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RTR session state.
//!
//! A session is the stateful remote-shell context the control plane opens
//! against a single agent. The control plane expires sessions after ~10
//! minutes of inactivity, so every long-running phase must refresh
//! (`pulse`) the session and stamp `last_pulse_at`.

use std::time::{Duration, Instant};

/// An open RTR session against one agent.
///
/// The engine must delete every session it opens; the session manager owns
/// the lifecycle, callers hold the session only for the duration of one
/// collection.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub device_id: String,
    pub created_at: Instant,
    pub last_pulse_at: Instant,
    /// Raw init response, kept for diagnostics.
    pub raw_init: serde_json::Value,
}

impl Session {
    pub fn new(session_id: String, device_id: String, raw_init: serde_json::Value) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            device_id,
            created_at: now,
            last_pulse_at: now,
            raw_init,
        }
    }

    /// Time since the session last saw a keepalive (or was created).
    pub fn age_since_pulse(&self) -> Duration {
        self.last_pulse_at.elapsed()
    }

    /// Record a successful keepalive.
    pub fn mark_pulsed(&mut self) {
        self.last_pulse_at = Instant::now();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
