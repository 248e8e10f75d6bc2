// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch run reporting.

use std::collections::BTreeMap;
use std::time::Duration;
use triage_core::format_elapsed;

/// Per-host result inside a batch.
#[derive(Debug, Clone)]
pub struct HostOutcome {
    pub ok: bool,
    /// Destination on success, error text on failure.
    pub detail: String,
    pub duration: Duration,
}

impl HostOutcome {
    pub fn succeeded(destination: String, duration: Duration) -> Self {
        Self {
            ok: true,
            detail: destination,
            duration,
        }
    }

    pub fn failed(reason: String, duration: Duration) -> Self {
        Self {
            ok: false,
            detail: reason,
            duration,
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub results: BTreeMap<String, HostOutcome>,
    pub elapsed: Duration,
    /// Set when credential rejection aborted the run early.
    pub fatal: Option<String>,
}

impl BatchReport {
    pub fn record(&mut self, hostname: &str, outcome: HostOutcome) {
        self.results.insert(hostname.to_string(), outcome);
    }

    pub fn successes(&self) -> usize {
        self.results.values().filter(|o| o.ok).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Whole-run verdict: success iff every host succeeded.
    pub fn all_ok(&self) -> bool {
        self.fatal.is_none() && !self.results.is_empty() && self.results.values().all(|o| o.ok)
    }

    /// Mean per-host duration over hosts that actually ran.
    pub fn average_host_duration(&self) -> Option<Duration> {
        let ran: Vec<&HostOutcome> = self
            .results
            .values()
            .filter(|o| o.duration > Duration::ZERO)
            .collect();
        if ran.is_empty() {
            return None;
        }
        let total: Duration = ran.iter().map(|o| o.duration).sum();
        Some(total / ran.len() as u32)
    }

    /// One line per host plus the performance summary.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .results
            .iter()
            .map(|(hostname, outcome)| {
                let mark = if outcome.ok { "ok" } else { "FAILED" };
                format!(
                    "{hostname}: {mark} ({}) {}",
                    format_elapsed(outcome.duration),
                    outcome.detail
                )
            })
            .collect();
        let average = self
            .average_host_duration()
            .map(|d| format!(", avg {}/host", format_elapsed(d)))
            .unwrap_or_default();
        lines.push(format!(
            "{}/{} succeeded in {}{average}",
            self.successes(),
            self.total(),
            format_elapsed(self.elapsed)
        ));
        lines
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
