// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved endpoint identity.

use crate::platform::Platform;
use serde::{Deserialize, Serialize};

/// Identity of a resolved endpoint, immutable after resolution.
///
/// `aid` is the globally unique agent id; `cid` is the tenant the agent
/// belongs to. RTR clients are created per `cid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub aid: String,
    pub cid: String,
    pub platform: Platform,
    pub os_version: String,
    pub cpu_name: String,
}
