// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line surface.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "triage",
    version,
    about = "Remote forensic collection over Falcon RTR"
)]
pub struct Cli {
    /// Configuration file (default: FALCON_CONFIG_PATH, ./config.yaml,
    /// ~/.fnerd_falconpy/config.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// KAPE collection on one Windows host
    Kape(HostArgs),
    /// UAC collection on one macOS/Linux host
    Uac(HostArgs),
    /// KAPE collections across many hosts
    KapeBatch(BatchArgs),
    /// UAC collections across many hosts
    UacBatch(BatchArgs),
}

#[derive(Args)]
pub struct HostArgs {
    /// Target hostname
    #[arg(short = 'n', long = "hostname")]
    pub hostname: String,

    /// KAPE target / UAC profile (defaults: !SANS_Triage / ir_triage)
    #[arg(short = 't', long = "target", alias = "profile", value_name = "NAME")]
    pub arg: Option<String>,

    /// Pull the archive to the current directory instead of uploading
    #[arg(long)]
    pub download: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Target hostnames (repeatable)
    #[arg(short = 'n', long = "hostname", required = true)]
    pub hostnames: Vec<String>,

    /// KAPE targets / UAC profiles: one for all hosts, or one per host
    #[arg(short = 't', long = "target", alias = "profile", value_name = "NAME")]
    pub args: Vec<String>,

    /// Pull archives to the current directory instead of uploading
    #[arg(long)]
    pub download: bool,
}

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;
