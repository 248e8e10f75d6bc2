// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Endpoint hosts-file entries.
//!
//! When uploads egress through a proxy, the endpoint must resolve the proxy
//! FQDN without external DNS. Entries are appended to `/etc/hosts` (Unix)
//! or `%SystemRoot%\drivers\etc\hosts` (Windows) for the duration of the
//! upload.

use serde::Deserialize;

/// One IP → hostname mapping pushed to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostEntry {
    pub ip: String,
    pub hostname: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl HostEntry {
    /// Line appended to the Unix hosts file.
    pub fn unix_line(&self) -> String {
        match &self.comment {
            Some(comment) => format!("{} {} #{}", self.ip, self.hostname, comment),
            None => format!("{} {}", self.ip, self.hostname),
        }
    }

    /// Line appended to the Windows hosts file. Fields are tab-separated;
    /// the backtick escapes the tab inside a PowerShell single-quoted
    /// string context.
    pub fn windows_line(&self) -> String {
        match &self.comment {
            Some(comment) => format!("{}`t{}`t#{}", self.ip, self.hostname, comment),
            None => format!("{}`t{}", self.ip, self.hostname),
        }
    }
}

#[cfg(test)]
#[path = "host_entries_tests.rs"]
mod tests;
