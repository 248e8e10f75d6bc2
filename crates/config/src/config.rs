// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration file loading.
//!
//! Settings come from a YAML file searched in priority order: an explicit
//! path, the `FALCON_CONFIG_PATH` environment variable, `./config.yaml`,
//! then `~/.fnerd_falconpy/config.yaml`. A missing file yields the built-in
//! defaults; a malformed file is an error.

use crate::host_entries::HostEntry;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use triage_core::{Platform, WorkspacePaths, DEFAULT_UNIX_WORKSPACE, DEFAULT_WINDOWS_WORKSPACE};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "FALCON_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("missing credentials: {0} is not set")]
    MissingCredentials(&'static str),
}

/// Top-level configuration. Every section has serde defaults so an empty
/// file (or no file) is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub s3: S3Config,
    pub proxy: ProxyConfig,
    pub host_entries: Vec<HostEntry>,
    pub timeouts: Timeouts,
    pub kape: KapeConfig,
    pub uac: UacConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub windows: String,
    pub unix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            windows: DEFAULT_WINDOWS_WORKSPACE.to_string(),
            unix: DEFAULT_UNIX_WORKSPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket_name: String,
    pub endpoint_url: Option<String>,
    pub region: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            endpoint_url: None,
            region: "us-east-1".to_string(),
        }
    }
}

/// Optional egress proxy: the presigned-URL host is rewritten to `host`
/// and a hosts-file entry for `host -> ip` is pushed to the endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: String,
    pub ip: String,
    pub enabled: bool,
}

/// Operation deadlines, in seconds on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub download: u64,
    pub upload: u64,
    pub sha_retrieval: u64,
    pub command_execution: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            download: 18_000,
            upload: 1_500,
            sha_retrieval: 2_000,
            command_execution: 600,
        }
    }
}

impl Timeouts {
    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download)
    }

    pub fn upload(&self) -> Duration {
        Duration::from_secs(self.upload)
    }

    pub fn sha_retrieval(&self) -> Duration {
        Duration::from_secs(self.sha_retrieval)
    }

    pub fn command_execution(&self) -> Duration {
        Duration::from_secs(self.command_execution)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KapeConfig {
    /// Seconds between `ps` checks while KAPE runs.
    pub monitoring_interval: u64,
    /// Per-target maximum monitoring time, overriding the built-in table.
    pub target_timeouts: HashMap<String, u64>,
    /// Local directory holding the KAPE tool tree to package.
    pub tool_dir: String,
    /// Local path of the deployment launcher script.
    pub deploy_script: String,
}

impl Default for KapeConfig {
    fn default() -> Self {
        Self {
            monitoring_interval: 60,
            target_timeouts: HashMap::new(),
            tool_dir: "resources/kape".to_string(),
            deploy_script: "resources/deploy_kape.ps1".to_string(),
        }
    }
}

// Maximum monitoring times observed in production for common targets.
const KAPE_TARGET_TIMEOUTS: &[(&str, u64)] = &[
    ("!BasicCollection", 300),
    ("KapeTriage", 1_800),
    ("RegistryHives", 60),
    ("EventLogs", 180),
    ("FileSystem", 600),
    ("!SANS_Triage", 1_200),
    ("WebBrowsers", 300),
    ("WindowsDefender", 180),
];

const KAPE_DEFAULT_TIMEOUT: u64 = 7_200;

impl KapeConfig {
    /// Maximum monitoring time for a target: YAML override, then the
    /// built-in table, then the 2-hour fallback.
    pub fn target_timeout(&self, target: &str) -> Duration {
        let secs = self.target_timeouts.get(target).copied().unwrap_or_else(|| {
            KAPE_TARGET_TIMEOUTS
                .iter()
                .find(|(name, _)| *name == target)
                .map(|(_, secs)| *secs)
                .unwrap_or(KAPE_DEFAULT_TIMEOUT)
        });
        Duration::from_secs(secs)
    }

    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UacConfig {
    pub default_profile: String,
    /// Seconds between log/evidence checks while UAC runs.
    pub monitoring_interval: u64,
    /// Per-profile maximum monitoring time, overriding the built-in table.
    pub profile_timeouts: HashMap<String, u64>,
    /// Local path of the prebuilt UAC package.
    pub package_path: String,
}

impl Default for UacConfig {
    fn default() -> Self {
        Self {
            default_profile: "ir_triage".to_string(),
            monitoring_interval: 30,
            profile_timeouts: HashMap::new(),
            package_path: "resources/uac/uac.zip".to_string(),
        }
    }
}

// Measured profile runtimes; ir_triage tested at ~79 minutes on macOS.
const UAC_PROFILE_TIMEOUTS: &[(&str, u64)] = &[
    ("ir_triage", 7_200),
    ("full", 21_600),
    ("offline", 3_600),
    ("logs", 3_600),
    ("memory_dump", 18_000),
    ("files", 14_400),
    ("network", 1_800),
    ("quick_triage_optimized", 3_600),
    ("ir_triage_no_hash", 5_400),
    ("network_compromise", 2_700),
    ("malware_hunt_fast", 4_500),
];

const UAC_DEFAULT_TIMEOUT: u64 = 18_000;

impl UacConfig {
    /// Maximum monitoring time for a profile: YAML override, then the
    /// built-in table, then the 5-hour fallback.
    pub fn profile_timeout(&self, profile: &str) -> Duration {
        let secs = self
            .profile_timeouts
            .get(profile)
            .copied()
            .unwrap_or_else(|| {
                UAC_PROFILE_TIMEOUTS
                    .iter()
                    .find(|(name, _)| *name == profile)
                    .map(|(_, secs)| *secs)
                    .unwrap_or(UAC_DEFAULT_TIMEOUT)
            });
        Duration::from_secs(secs)
    }

    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval)
    }
}

impl Config {
    /// Load from the first config file found, or defaults if none exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::find_config_file(explicit) {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                Self::from_yaml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Some(path);
            }
        }
        let cwd_config = PathBuf::from("config.yaml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }
        let home_config = dirs::home_dir()?.join(".fnerd_falconpy").join("config.yaml");
        home_config.exists().then_some(home_config)
    }

    /// Workspace paths for one endpoint platform.
    pub fn workspace_for(&self, platform: Platform) -> WorkspacePaths {
        let base = match platform {
            Platform::Windows => &self.workspace.windows,
            Platform::Mac | Platform::Linux => &self.workspace.unix,
        };
        WorkspacePaths::new(platform, base.clone())
    }

    /// Hosts-file entries to push to an endpoint before a proxied upload:
    /// the configured list plus the proxy mapping itself when enabled.
    pub fn effective_host_entries(&self) -> Vec<HostEntry> {
        let mut entries = self.host_entries.clone();
        if self.proxy.enabled && !self.proxy.host.is_empty() && !self.proxy.ip.is_empty() {
            entries.push(HostEntry {
                ip: self.proxy.ip.clone(),
                hostname: self.proxy.host.clone(),
                comment: Some("s3-proxy".to_string()),
            });
        }
        entries
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
