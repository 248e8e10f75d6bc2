// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders shared by other crates' tests.

use crate::{HostInfo, Platform, Session};

/// A resolved Windows host with placeholder identity fields.
pub fn windows_host(hostname: &str) -> HostInfo {
    HostInfo {
        hostname: hostname.to_string(),
        aid: format!("aid-{hostname}"),
        cid: "cid-test".to_string(),
        platform: Platform::Windows,
        os_version: "Windows 11".to_string(),
        cpu_name: "test-cpu".to_string(),
    }
}

/// A resolved Linux host with placeholder identity fields.
pub fn linux_host(hostname: &str) -> HostInfo {
    HostInfo {
        hostname: hostname.to_string(),
        aid: format!("aid-{hostname}"),
        cid: "cid-test".to_string(),
        platform: Platform::Linux,
        os_version: "Ubuntu 22.04".to_string(),
        cpu_name: "test-cpu".to_string(),
    }
}

/// An open session against the given agent id.
pub fn open_session(device_id: &str) -> Session {
    Session::new(
        format!("sess-{device_id}"),
        device_id.to_string(),
        serde_json::json!({"status": "created"}),
    )
}
