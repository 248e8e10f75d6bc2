// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Endpoint platform classification.
//!
//! The control plane reports a free-form platform name ("Windows", "Mac",
//! "Linux"); collection behavior branches on the normalized value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operating-system family of an endpoint agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Mac,
    Linux,
}

/// Error for platform strings the control plane should never send.
#[derive(Debug, Clone, Error)]
#[error("unknown platform: {0}")]
pub struct ParsePlatformError(pub String);

impl Platform {
    /// True for macOS and Linux, which share the UAC collection path.
    pub fn is_unix(self) -> bool {
        matches!(self, Platform::Mac | Platform::Linux)
    }

    /// Lower-case wire name, as used in artifact keys and log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Mac => "mac",
            Platform::Linux => "linux",
        }
    }
}

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "windows" => Ok(Platform::Windows),
            "mac" => Ok(Platform::Mac),
            "linux" => Ok(Platform::Linux),
            other => Err(ParsePlatformError(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "platform_tests.rs"]
mod tests;
