// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane (RTR) client adapter.

mod falcon;
mod retry;
mod types;

pub use falcon::{ClientFactory, FalconClient};
pub use types::{BatchSession, CommandStatus, DeviceDetails, SessionHandle};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use thiserror::Error;
use triage_core::{CloudFile, ExtractedFile};

/// Errors from control-plane operations.
#[derive(Debug, Error)]
pub enum RtrError {
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("api error {code}: {message}")]
    Api { code: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response missing field: {0}")]
    MissingField(&'static str),
    /// The extracted file is not yet ingested; callers keep polling.
    #[error("file not yet available")]
    UnknownFile,
}

impl RtrError {
    /// True for failures worth an exponential-backoff retry. Matches the
    /// transient transport vocabulary only; API rejections are permanent.
    pub fn is_network(&self) -> bool {
        let RtrError::Transport(message) = self else {
            return false;
        };
        let lower = message.to_lowercase();
        ["resolve", "connection", "network", "timeout", "dns"]
            .iter()
            .any(|needle| lower.contains(needle))
    }
}

/// Typed surface of the vendor control plane.
///
/// One client is scoped to one customer-id; the [`ClientFactory`] caches
/// initialized clients per tenant.
#[async_trait]
pub trait CloudClient: Clone + Send + Sync + 'static {
    /// Query agent ids by host filter expression.
    async fn query_hosts(&self, filter: &str) -> Result<Vec<String>, RtrError>;

    /// Fetch device records for a set of agent ids.
    async fn get_host_details(&self, aids: &[String]) -> Result<Vec<DeviceDetails>, RtrError>;

    /// Open an RTR session against one agent.
    async fn init_session(&self, device_id: &str) -> Result<SessionHandle, RtrError>;

    /// Refresh the session keepalive for one agent.
    async fn pulse_session(&self, device_id: &str) -> Result<(), RtrError>;

    /// Delete an open session.
    async fn delete_session(&self, session_id: &str) -> Result<(), RtrError>;

    /// Submit a read-only command; returns the cloud request id.
    async fn execute_command(
        &self,
        session_id: &str,
        base_command: &str,
        command_string: &str,
    ) -> Result<String, RtrError>;

    /// Submit an admin command; returns the cloud request id.
    async fn execute_admin_command(
        &self,
        session_id: &str,
        base_command: &str,
        command_string: &str,
    ) -> Result<String, RtrError>;

    /// Submit an active-responder command (the class that can retrieve
    /// files from the endpoint); returns the cloud request id.
    async fn execute_active_responder(
        &self,
        base_command: &str,
        command_string: &str,
        device_id: &str,
        session_id: &str,
    ) -> Result<String, RtrError>;

    async fn check_command_status(
        &self,
        cloud_request_id: &str,
        sequence_id: u32,
    ) -> Result<CommandStatus, RtrError>;

    async fn check_admin_command_status(
        &self,
        cloud_request_id: &str,
        sequence_id: u32,
    ) -> Result<CommandStatus, RtrError>;

    async fn check_active_responder_status(
        &self,
        cloud_request_id: &str,
    ) -> Result<CommandStatus, RtrError>;

    /// List files the control plane has extracted from this session.
    async fn list_session_files(&self, session_id: &str) -> Result<Vec<ExtractedFile>, RtrError>;

    /// Fetch extracted-file content. Returns [`RtrError::UnknownFile`]
    /// while ingestion is still in progress.
    async fn get_extracted_file(
        &self,
        session_id: &str,
        sha256: &str,
        filename: &str,
    ) -> Result<Vec<u8>, RtrError>;

    /// List put-file ids in this tenant's repository.
    async fn list_put_files(&self) -> Result<Vec<String>, RtrError>;

    /// Fetch put-file records by id.
    async fn get_put_files(&self, ids: &[String]) -> Result<Vec<CloudFile>, RtrError>;

    /// Upload a named payload to the put-file repository.
    async fn create_put_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
        comment: &str,
        description: &str,
    ) -> Result<(), RtrError>;

    /// Delete a put-file by id.
    async fn delete_put_file(&self, id: &str) -> Result<(), RtrError>;

    /// Open sessions against many agents at once.
    async fn batch_init_sessions(&self, device_ids: &[String]) -> Result<BatchSession, RtrError>;

    /// Refresh every session in a batch.
    async fn batch_refresh_sessions(&self, batch_id: &str) -> Result<(), RtrError>;

    /// Run one command across a batch; returns per-agent status.
    async fn batch_command(
        &self,
        batch_id: &str,
        base_command: &str,
        command_string: &str,
    ) -> Result<std::collections::HashMap<String, CommandStatus>, RtrError>;

    /// Issue a batch `get`; returns the batch request id.
    async fn batch_get_command(
        &self,
        batch_id: &str,
        file_path: &str,
    ) -> Result<String, RtrError>;

    /// Poll a batch `get`; returns per-agent extracted-file records.
    async fn batch_get_command_status(
        &self,
        batch_req_id: &str,
    ) -> Result<std::collections::HashMap<String, ExtractedFile>, RtrError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
