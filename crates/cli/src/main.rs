// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! triage - remote forensic collection over Falcon RTR

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod args;

use anyhow::{bail, Context, Result};
use args::{BatchArgs, Cli, Command, HostArgs};
use clap::Parser;
use std::process::ExitCode;
use triage_adapters::{ClientFactory, S3Store};
use triage_config::{Config, Credentials};
use triage_engine::{EvacuationMode, FalconOrchestrator, Payloads};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<bool> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let credentials = Credentials::from_env().context("reading control-plane credentials")?;

    let mode = if cli.download() {
        EvacuationMode::Download
    } else {
        EvacuationMode::Upload
    };
    if mode == EvacuationMode::Upload && config.s3.bucket_name.is_empty() {
        bail!("upload mode requires s3.bucket_name in the configuration; pass --download to pull locally");
    }

    let store = S3Store::connect(
        config.s3.bucket_name.clone(),
        &config.s3.region,
        config.s3.endpoint_url.as_deref(),
    )
    .await;
    let payloads = load_payloads(&config, &cli.command)?;
    let factory = ClientFactory::new(credentials.clone());
    let directory = triage_adapters::FalconClient::new(credentials, None);
    let orchestrator =
        FalconOrchestrator::new(directory, factory, store, config, payloads);

    match &cli.command {
        Command::Kape(HostArgs { hostname, arg, .. }) => {
            let target = arg.as_deref().unwrap_or("!SANS_Triage");
            let outcome = orchestrator
                .run_windows_triage(hostname, target, mode)
                .await?;
            println!(
                "{}: ok {} ({} bytes)",
                outcome.hostname, outcome.destination, outcome.size
            );
            Ok(true)
        }
        Command::Uac(HostArgs { hostname, arg, .. }) => {
            let outcome = orchestrator
                .run_unix_triage(hostname, arg.as_deref(), mode)
                .await?;
            println!(
                "{}: ok {} ({} bytes)",
                outcome.hostname, outcome.destination, outcome.size
            );
            Ok(true)
        }
        Command::KapeBatch(batch) => {
            let pairs = batch.pairs("!SANS_Triage")?;
            let report = orchestrator.run_kape_batch(&pairs, mode).await;
            for line in report.summary_lines() {
                println!("{line}");
            }
            Ok(report.all_ok())
        }
        Command::UacBatch(batch) => {
            let pairs = batch.pairs("ir_triage")?;
            let report = orchestrator.run_uac_batch(&pairs, mode).await;
            for line in report.summary_lines() {
                println!("{line}");
            }
            Ok(report.all_ok())
        }
    }
}

/// Read the payload files the selected command needs.
fn load_payloads(config: &Config, command: &Command) -> Result<Payloads> {
    let kape_tool_dir = std::path::PathBuf::from(&config.kape.tool_dir);
    let mut payloads = Payloads {
        kape_tool_dir,
        kape_deploy_script: Vec::new(),
        uac_package: Vec::new(),
    };
    match command {
        Command::Kape(_) | Command::KapeBatch(_) => {
            payloads.kape_deploy_script = std::fs::read(&config.kape.deploy_script)
                .with_context(|| format!("reading {}", config.kape.deploy_script))?;
        }
        Command::Uac(_) | Command::UacBatch(_) => {
            payloads.uac_package = std::fs::read(&config.uac.package_path)
                .with_context(|| format!("reading {}", config.uac.package_path))?;
        }
    }
    Ok(payloads)
}

impl Cli {
    fn download(&self) -> bool {
        match &self.command {
            Command::Kape(args) | Command::Uac(args) => args.download,
            Command::KapeBatch(args) | Command::UacBatch(args) => args.download,
        }
    }
}

impl BatchArgs {
    /// Zip hostnames with their per-host argument. A single argument
    /// fans out to every host; otherwise counts must line up.
    fn pairs(&self, default_arg: &str) -> Result<Vec<(String, String)>> {
        if self.hostnames.is_empty() {
            bail!("at least one --hostname is required");
        }
        let args: Vec<String> = match self.args.len() {
            0 => vec![default_arg.to_string(); self.hostnames.len()],
            1 => vec![self.args[0].clone(); self.hostnames.len()],
            n if n == self.hostnames.len() => self.args.clone(),
            n => bail!(
                "{n} targets for {} hostnames; pass one target or one per host",
                self.hostnames.len()
            ),
        };
        Ok(self
            .hostnames
            .iter()
            .cloned()
            .zip(args)
            .collect())
    }
}
