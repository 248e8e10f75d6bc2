// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! triage-config: YAML configuration and credential resolution

mod config;
mod credentials;
mod host_entries;

pub use config::{
    Config, ConfigError, KapeConfig, ProxyConfig, S3Config, Timeouts, UacConfig, WorkspaceConfig,
    CONFIG_PATH_ENV,
};
pub use credentials::Credentials;
pub use host_entries::HostEntry;
