// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collection entry points: single-host runs and the batch fan-out.
//!
//! Batch runs group hosts by customer-id, upload the per-tenant payloads
//! exactly once behind a gate, and fan out per-host collections over a
//! bounded worker pool. Every worker owns exactly one session; nothing is
//! shared between hosts beyond the payload memoization.

use crate::batch::{BatchReport, HostOutcome};
use crate::error::EngineError;
use crate::kape::KapeCollector;
use crate::package;
use crate::resolver::HostResolver;
use crate::session::AgentGate;
use crate::transfer::{ensure_put_file, put_file_exists};
use crate::uac::UacCollector;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use triage_adapters::{ClientFactory, CloudClient, FalconClient, ObjectStore};
use triage_config::Config;
use triage_core::{HostInfo, Platform};

/// Where the evacuated archive goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvacuationMode {
    /// Endpoint PUTs the archive to object storage.
    Upload,
    /// Pull through the control plane to the operator's workstation.
    Download,
}

/// Result of one completed collection.
#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    pub hostname: String,
    /// Evacuated artifact name (always `.7z`).
    pub artifact: String,
    pub size: u64,
    /// `s3://bucket/key` or a local path.
    pub destination: String,
}

/// Local inputs for the deployable payloads.
#[derive(Debug, Clone)]
pub struct Payloads {
    /// KAPE tool tree to zip per target.
    pub kape_tool_dir: PathBuf,
    /// `deploy_kape.ps1` contents.
    pub kape_deploy_script: Vec<u8>,
    /// Prebuilt `uac.zip` contents.
    pub uac_package: Vec<u8>,
}

/// Hands out a tenant-scoped control-plane client.
pub trait ClientProvider<C: CloudClient>: Send + Sync + 'static {
    fn for_cid(&self, cid: &str) -> C;
}

impl ClientProvider<FalconClient> for ClientFactory {
    fn for_cid(&self, cid: &str) -> FalconClient {
        ClientFactory::for_cid(self, cid)
    }
}

/// Provider for single-tenant deployments and tests: every customer-id
/// maps to the same client.
pub struct SingleClient<C: CloudClient>(pub C);

impl<C: CloudClient> ClientProvider<C> for SingleClient<C> {
    fn for_cid(&self, _cid: &str) -> C {
        self.0.clone()
    }
}

/// Production wiring: per-tenant clients from one factory.
pub type FalconOrchestrator<S> = Orchestrator<FalconClient, S, ClientFactory>;

const DEFAULT_MAX_CONCURRENT_HOSTS: usize = 10;
/// Put-file propagation wait after a fresh UAC upload.
const UAC_PROPAGATION_WAIT: Duration = Duration::from_secs(30);

/// (cid, put-file name) pairs already uploaded this process run.
type UploadedSet = parking_lot::Mutex<HashSet<(String, String)>>;

/// The engine facade: resolve, collect, evacuate, for one host or a fleet.
pub struct Orchestrator<C: CloudClient, S: ObjectStore, P: ClientProvider<C>> {
    provider: Arc<P>,
    store: S,
    config: Arc<Config>,
    payloads: Arc<Payloads>,
    resolver: HostResolver<C>,
    max_concurrent_hosts: usize,
    uploaded: Arc<UploadedSet>,
    /// Serializes the payload-upload critical section across workers.
    upload_gate: Arc<tokio::sync::Mutex<()>>,
    /// Serializes sessions per agent across all collections.
    agent_gate: AgentGate,
}

impl<C, S, P> Orchestrator<C, S, P>
where
    C: CloudClient,
    S: ObjectStore,
    P: ClientProvider<C>,
{
    /// `directory` is the client used for host resolution; `provider`
    /// yields per-tenant clients for RTR work.
    pub fn new(directory: C, provider: P, store: S, config: Config, payloads: Payloads) -> Self {
        Self {
            provider: Arc::new(provider),
            store,
            config: Arc::new(config),
            payloads: Arc::new(payloads),
            resolver: HostResolver::new(directory),
            max_concurrent_hosts: DEFAULT_MAX_CONCURRENT_HOSTS,
            uploaded: Arc::new(parking_lot::Mutex::new(HashSet::new())),
            upload_gate: Arc::new(tokio::sync::Mutex::new(())),
            agent_gate: AgentGate::default(),
        }
    }

    pub fn with_max_concurrent_hosts(mut self, limit: usize) -> Self {
        self.max_concurrent_hosts = limit.max(1);
        self
    }

    /// Run a KAPE collection against one Windows host.
    pub async fn run_windows_triage(
        &self,
        hostname: &str,
        target: &str,
        mode: EvacuationMode,
    ) -> Result<CollectionOutcome, EngineError> {
        let host = self.resolver.resolve(hostname).await?;
        let client = self.provider.for_cid(&host.cid);
        ensure_kape_payload(
            &client,
            &host.cid,
            target,
            &self.config,
            &self.payloads,
            &self.uploaded,
            &self.upload_gate,
        )
        .await?;
        let collector = KapeCollector::new(
            client,
            self.store.clone(),
            self.config.clone(),
            self.agent_gate.clone(),
        );
        let local_dir = std::env::current_dir()?;
        collector.run(&host, target, mode, &local_dir).await
    }

    /// Run a UAC collection against one macOS or Linux host.
    pub async fn run_unix_triage(
        &self,
        hostname: &str,
        profile: Option<&str>,
        mode: EvacuationMode,
    ) -> Result<CollectionOutcome, EngineError> {
        let host = self.resolver.resolve(hostname).await?;
        let profile = profile
            .unwrap_or(&self.config.uac.default_profile)
            .to_string();
        let client = self.provider.for_cid(&host.cid);
        ensure_uac_payload(
            &client,
            &host.cid,
            &self.payloads,
            &self.uploaded,
            &self.upload_gate,
        )
        .await?;
        let collector = UacCollector::new(
            client,
            self.store.clone(),
            self.config.clone(),
            self.agent_gate.clone(),
        );
        let local_dir = std::env::current_dir()?;
        collector.run(&host, &profile, mode, &local_dir).await
    }

    /// Fan a KAPE collection out over `(hostname, target)` pairs.
    pub async fn run_kape_batch(
        &self,
        pairs: &[(String, String)],
        mode: EvacuationMode,
    ) -> BatchReport {
        self.run_batch(pairs, mode, Platform::Windows).await
    }

    /// Fan a UAC collection out over `(hostname, profile)` pairs.
    pub async fn run_uac_batch(
        &self,
        pairs: &[(String, String)],
        mode: EvacuationMode,
    ) -> BatchReport {
        self.run_batch(pairs, mode, Platform::Linux).await
    }

    /// Shared batch pipeline; `kind` selects the collector family
    /// (Windows → KAPE, anything Unix → UAC).
    async fn run_batch(
        &self,
        pairs: &[(String, String)],
        mode: EvacuationMode,
        kind: Platform,
    ) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport::default();

        // Resolve everything first; unresolved hosts are recorded and
        // skipped, credential rejection aborts the run.
        let mut resolved: Vec<(HostInfo, String)> = Vec::new();
        for (hostname, arg) in pairs {
            match self.resolver.resolve(hostname).await {
                Ok(host) => resolved.push((host, arg.clone())),
                Err(err) if err.is_fatal_auth() => {
                    tracing::error!(error = %err, "credentials rejected, aborting batch");
                    report.record(hostname, HostOutcome::failed(err.to_string(), Duration::ZERO));
                    report.fatal = Some(err.to_string());
                    report.elapsed = started.elapsed();
                    return report;
                }
                Err(err) => {
                    tracing::warn!(hostname = %hostname, error = %err, "skipping unresolved host");
                    report.record(hostname, HostOutcome::failed(err.to_string(), Duration::ZERO));
                }
            }
        }

        // Partition by tenant; each group gets its own bounded pool.
        let mut by_cid: BTreeMap<String, Vec<(HostInfo, String)>> = BTreeMap::new();
        for entry in resolved {
            by_cid.entry(entry.0.cid.clone()).or_default().push(entry);
        }

        for (cid, group) in by_cid {
            let permits = group.len().min(self.max_concurrent_hosts);
            let pool = Arc::new(tokio::sync::Semaphore::new(permits));
            let mut workers = Vec::new();
            tracing::info!(cid = %cid, hosts = group.len(), permits, "starting tenant batch");

            for (host, arg) in group {
                let pool = pool.clone();
                let client = self.provider.for_cid(&host.cid);
                let store = self.store.clone();
                let config = self.config.clone();
                let payloads = self.payloads.clone();
                let uploaded = self.uploaded.clone();
                let upload_gate = self.upload_gate.clone();
                let agent_gate = self.agent_gate.clone();
                let worker_mode = mode;

                workers.push(tokio::spawn(async move {
                    // An owned permit; acquisition fails only if the pool
                    // is closed, which we never do.
                    let Ok(_permit) = pool.acquire_owned().await else {
                        return (
                            host.hostname.clone(),
                            HostOutcome::failed("worker pool closed".to_string(), Duration::ZERO),
                        );
                    };
                    let work_started = Instant::now();
                    let result = run_one(
                        client,
                        store,
                        config,
                        payloads,
                        uploaded,
                        upload_gate,
                        agent_gate,
                        &host,
                        &arg,
                        worker_mode,
                        kind,
                    )
                    .await;
                    let duration = work_started.elapsed();
                    let outcome = match result {
                        Ok(outcome) => {
                            tracing::info!(
                                hostname = %host.hostname,
                                destination = %outcome.destination,
                                "collection succeeded"
                            );
                            HostOutcome::succeeded(outcome.destination, duration)
                        }
                        Err(err) => {
                            tracing::error!(hostname = %host.hostname, error = %err, "collection failed");
                            HostOutcome::failed(err.to_string(), duration)
                        }
                    };
                    (host.hostname.clone(), outcome)
                }));
            }

            for worker in workers {
                match worker.await {
                    Ok((hostname, outcome)) => report.record(&hostname, outcome),
                    Err(join_err) => {
                        tracing::error!(error = %join_err, "batch worker panicked or was cancelled");
                    }
                }
            }
        }

        report.elapsed = started.elapsed();
        report
    }
}

/// One batch worker: memoized payload upload, then the collection.
#[allow(clippy::too_many_arguments)]
async fn run_one<C: CloudClient, S: ObjectStore>(
    client: C,
    store: S,
    config: Arc<Config>,
    payloads: Arc<Payloads>,
    uploaded: Arc<UploadedSet>,
    upload_gate: Arc<tokio::sync::Mutex<()>>,
    agent_gate: AgentGate,
    host: &HostInfo,
    arg: &str,
    mode: EvacuationMode,
    kind: Platform,
) -> Result<CollectionOutcome, EngineError> {
    let local_dir = std::env::current_dir()?;
    match kind {
        Platform::Windows => {
            ensure_kape_payload(
                &client,
                &host.cid,
                arg,
                &config,
                &payloads,
                &uploaded,
                &upload_gate,
            )
            .await?;
            let collector = KapeCollector::new(client, store, config, agent_gate);
            collector.run(host, arg, mode, &local_dir).await
        }
        Platform::Mac | Platform::Linux => {
            ensure_uac_payload(&client, &host.cid, &payloads, &uploaded, &upload_gate).await?;
            let collector = UacCollector::new(client, store, config, agent_gate);
            collector.run(host, arg, mode, &local_dir).await
        }
    }
}

/// Upload `kape.zip` (built for `target`) and the launcher script, at
/// most once per tenant this process run.
async fn ensure_kape_payload<C: CloudClient>(
    client: &C,
    cid: &str,
    target: &str,
    config: &Config,
    payloads: &Payloads,
    uploaded: &UploadedSet,
    gate: &tokio::sync::Mutex<()>,
) -> Result<(), EngineError> {
    ensure_payload_once(cid, "kape.zip", uploaded, gate, || async {
        let ws = config.workspace_for(Platform::Windows);
        let kape_zip = package::build_kape_zip(&payloads.kape_tool_dir, target, ws.base())?;
        ensure_put_file(
            client,
            "kape.zip",
            kape_zip,
            "Kape Triage Tool Upload",
            "4n6 Triage Tool",
        )
        .await?;
        ensure_put_file(
            client,
            "deploy_kape.ps1",
            payloads.kape_deploy_script.clone(),
            "Kape Triage Execution Script",
            "Kape Launcher Script",
        )
        .await?;
        Ok(())
    })
    .await
}

/// Upload a fresh `uac.zip` (profile contents may have changed), wait
/// for repository propagation and confirm presence, once per tenant.
async fn ensure_uac_payload<C: CloudClient>(
    client: &C,
    cid: &str,
    payloads: &Payloads,
    uploaded: &UploadedSet,
    gate: &tokio::sync::Mutex<()>,
) -> Result<(), EngineError> {
    ensure_payload_once(cid, "uac.zip", uploaded, gate, || async {
        ensure_put_file(
            client,
            "uac.zip",
            payloads.uac_package.clone(),
            "UAC Collection Tool Upload",
            "Unix-like Artifacts Collector",
        )
        .await?;
        tokio::time::sleep(UAC_PROPAGATION_WAIT).await;
        if !put_file_exists(client, "uac.zip").await? {
            return Err(EngineError::TransferFailed(
                "uac.zip absent from repository after propagation wait".to_string(),
            ));
        }
        Ok(())
    })
    .await
}

/// Run `upload` at most once per `(cid, name)` for this process, with
/// the critical section serialized so parallel workers share one upload.
async fn ensure_payload_once<F, Fut>(
    cid: &str,
    name: &str,
    uploaded: &UploadedSet,
    gate: &tokio::sync::Mutex<()>,
    upload: F,
) -> Result<(), EngineError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), EngineError>>,
{
    let key = (cid.to_string(), name.to_string());
    if uploaded.lock().contains(&key) {
        return Ok(());
    }
    let _guard = gate.lock().await;
    if uploaded.lock().contains(&key) {
        return Ok(());
    }
    upload().await?;
    uploaded.lock().insert(key);
    Ok(())
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
