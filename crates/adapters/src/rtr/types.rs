// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the control-plane REST surface.

use serde::Deserialize;
use std::collections::HashMap;

/// Response envelope shared by every control-plane endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
    #[serde(default)]
    pub errors: Vec<ApiError>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Meta {
    #[serde(default)]
    pub writes: Option<Writes>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Writes {
    #[serde(default)]
    pub resources_affected: u64,
}

/// Device record from the hosts surface. The discovery and hosts APIs
/// disagree on field names (`aid` vs `device_id`), so both are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceDetails {
    #[serde(default, alias = "aid")]
    pub device_id: String,
    #[serde(default)]
    pub cid: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub platform_name: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default, alias = "cpu_processor_name")]
    pub cpu_name: String,
}

/// Result of a session init.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: String,
    /// True when the control plane reported the session as created.
    pub created: bool,
    pub raw: serde_json::Value,
}

/// Point-in-time status of a submitted command.
#[derive(Debug, Clone, Default)]
pub struct CommandStatus {
    pub complete: bool,
    pub stdout: String,
    pub stderr: String,
}

/// A batch of sessions opened in one call.
#[derive(Debug, Clone)]
pub struct BatchSession {
    pub batch_id: String,
    /// agent id -> session id for each agent that came up.
    pub sessions: HashMap<String, String>,
}

/// Session resource inside an init/batch-init envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct SessionResource {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub aid: String,
}

/// Command resource returned by submit endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct CommandResource {
    #[serde(default)]
    pub cloud_request_id: String,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

/// Session-file resource from the file-listing endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct SessionFileResource {
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub cloud_request_id: String,
    #[serde(default, alias = "name")]
    pub filename: String,
}

/// Put-file record from the repository endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct PutFileResource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sha256: String,
}
