// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory control-plane fake for engine tests.
//!
//! Commands are matched against scripted rules by substring; each matching
//! submit pops the next scripted status (the last one repeats), which lets
//! tests model monitoring loops that observe a process disappear.

use crate::rtr::types::{BatchSession, CommandStatus, DeviceDetails, SessionHandle};
use crate::rtr::{CloudClient, RtrError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use triage_core::{CloudFile, ExtractedFile};

/// One recorded control-plane call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtrCall {
    QueryHosts(String),
    GetHostDetails(Vec<String>),
    InitSession(String),
    PulseSession(String),
    DeleteSession(String),
    Command { verb: String, cmdline: String },
    AdminCommand { verb: String, cmdline: String },
    ActiveResponder { verb: String, cmdline: String },
    ListSessionFiles(String),
    GetExtractedFile { sha256: String },
    ListPutFiles,
    GetPutFiles(Vec<String>),
    CreatePutFile(String),
    DeletePutFile(String),
}

struct CommandRule {
    pattern: String,
    responses: VecDeque<CommandStatus>,
}

struct ExtractedContent {
    bytes: Vec<u8>,
    unknown_polls_left: u32,
}

#[derive(Default)]
struct State {
    calls: Vec<RtrCall>,
    devices: Vec<DeviceDetails>,
    rules: Vec<CommandRule>,
    results: HashMap<String, CommandStatus>,
    next_id: u64,
    open_sessions: Vec<String>,
    pulse_failures_pending: u32,
    init_failures_pending: u32,
    session_files: Vec<ExtractedFile>,
    session_file_polls_until_visible: u32,
    extracted: HashMap<String, ExtractedContent>,
    put_files: HashMap<String, CloudFile>,
    put_file_uploads: HashMap<String, u32>,
}

/// Scripted fake implementation of [`CloudClient`].
#[derive(Clone, Default)]
pub struct FakeCloudClient {
    state: Arc<Mutex<State>>,
}

/// Shorthand for a completed, clean command status.
pub fn ok(stdout: &str) -> CommandStatus {
    CommandStatus {
        complete: true,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

impl FakeCloudClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register resolvable devices; `query_hosts` substring-matches their
    /// hostnames against the filter expression.
    pub fn set_devices(&self, devices: Vec<DeviceDetails>) {
        self.state.lock().devices = devices;
    }

    /// Script responses for commands whose command string contains
    /// `pattern`. Each matching submit pops the next status; the final
    /// status repeats forever.
    pub fn on_command(&self, pattern: &str, responses: Vec<CommandStatus>) {
        self.state.lock().rules.push(CommandRule {
            pattern: pattern.to_string(),
            responses: responses.into(),
        });
    }

    /// Make the next `count` pulses fail, simulating session expiry.
    pub fn fail_next_pulses(&self, count: u32) {
        self.state.lock().pulse_failures_pending = count;
    }

    /// Make the next `count` session inits fail.
    pub fn fail_next_inits(&self, count: u32) {
        self.state.lock().init_failures_pending = count;
    }

    /// Stage a session-file record that becomes visible after `polls`
    /// list calls (the control plane ingests large files slowly).
    pub fn stage_session_file(&self, file: ExtractedFile, polls_until_visible: u32) {
        let mut state = self.state.lock();
        state.session_files.push(file);
        state.session_file_polls_until_visible = polls_until_visible;
    }

    /// Stage extracted-file content, returning "Unknown file" for the
    /// first `unknown_polls` fetches.
    pub fn stage_extracted_content(&self, sha256: &str, bytes: Vec<u8>, unknown_polls: u32) {
        self.state.lock().extracted.insert(
            sha256.to_string(),
            ExtractedContent {
                bytes,
                unknown_polls_left: unknown_polls,
            },
        );
    }

    /// Pre-populate a put-file, as if a previous run uploaded it.
    pub fn seed_put_file(&self, name: &str) {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("pf-{}", state.next_id);
        state.put_files.insert(
            id.clone(),
            CloudFile {
                id,
                name: name.to_string(),
                sha256: "seeded".to_string(),
            },
        );
    }

    pub fn calls(&self) -> Vec<RtrCall> {
        self.state.lock().calls.clone()
    }

    /// Sessions opened and not yet deleted.
    pub fn open_sessions(&self) -> Vec<String> {
        self.state.lock().open_sessions.clone()
    }

    /// Number of `create_put_file` calls for a name.
    pub fn put_file_uploads(&self, name: &str) -> u32 {
        self.state
            .lock()
            .put_file_uploads
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn put_file_names(&self) -> Vec<String> {
        self.state
            .lock()
            .put_files
            .values()
            .map(|f| f.name.clone())
            .collect()
    }

    fn submit(&self, command_string: &str) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        let req_id = format!("req-{}", state.next_id);
        let status = state
            .rules
            .iter_mut()
            .find(|rule| command_string.contains(&rule.pattern))
            .map(|rule| {
                if rule.responses.len() > 1 {
                    rule.responses.pop_front().unwrap_or_else(|| ok(""))
                } else {
                    rule.responses.front().cloned().unwrap_or_else(|| ok(""))
                }
            })
            .unwrap_or_else(|| ok(""));
        state.results.insert(req_id.clone(), status);
        req_id
    }

    fn record(&self, call: RtrCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl CloudClient for FakeCloudClient {
    async fn query_hosts(&self, filter: &str) -> Result<Vec<String>, RtrError> {
        self.record(RtrCall::QueryHosts(filter.to_string()));
        let state = self.state.lock();
        Ok(state
            .devices
            .iter()
            .filter(|d| filter.contains(&d.hostname))
            .map(|d| d.device_id.clone())
            .collect())
    }

    async fn get_host_details(&self, aids: &[String]) -> Result<Vec<DeviceDetails>, RtrError> {
        self.record(RtrCall::GetHostDetails(aids.to_vec()));
        let state = self.state.lock();
        Ok(state
            .devices
            .iter()
            .filter(|d| aids.contains(&d.device_id))
            .cloned()
            .collect())
    }

    async fn init_session(&self, device_id: &str) -> Result<SessionHandle, RtrError> {
        self.record(RtrCall::InitSession(device_id.to_string()));
        let mut state = self.state.lock();
        if state.init_failures_pending > 0 {
            state.init_failures_pending -= 1;
            return Err(RtrError::Api {
                code: 500,
                message: "session init unavailable".to_string(),
            });
        }
        state.next_id += 1;
        let session_id = format!("sess-{}", state.next_id);
        state.open_sessions.push(session_id.clone());
        Ok(SessionHandle {
            session_id,
            created: true,
            raw: serde_json::json!({ "device_id": device_id }),
        })
    }

    async fn pulse_session(&self, device_id: &str) -> Result<(), RtrError> {
        self.record(RtrCall::PulseSession(device_id.to_string()));
        let mut state = self.state.lock();
        if state.pulse_failures_pending > 0 {
            state.pulse_failures_pending -= 1;
            return Err(RtrError::Api {
                code: 404,
                message: "session not found".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), RtrError> {
        self.record(RtrCall::DeleteSession(session_id.to_string()));
        let mut state = self.state.lock();
        state.open_sessions.retain(|id| id != session_id);
        Ok(())
    }

    async fn execute_command(
        &self,
        _session_id: &str,
        base_command: &str,
        command_string: &str,
    ) -> Result<String, RtrError> {
        self.record(RtrCall::Command {
            verb: base_command.to_string(),
            cmdline: command_string.to_string(),
        });
        Ok(self.submit(command_string))
    }

    async fn execute_admin_command(
        &self,
        _session_id: &str,
        base_command: &str,
        command_string: &str,
    ) -> Result<String, RtrError> {
        self.record(RtrCall::AdminCommand {
            verb: base_command.to_string(),
            cmdline: command_string.to_string(),
        });
        Ok(self.submit(command_string))
    }

    async fn execute_active_responder(
        &self,
        base_command: &str,
        command_string: &str,
        _device_id: &str,
        _session_id: &str,
    ) -> Result<String, RtrError> {
        self.record(RtrCall::ActiveResponder {
            verb: base_command.to_string(),
            cmdline: command_string.to_string(),
        });
        Ok(self.submit(command_string))
    }

    async fn check_command_status(
        &self,
        cloud_request_id: &str,
        _sequence_id: u32,
    ) -> Result<CommandStatus, RtrError> {
        let state = self.state.lock();
        state
            .results
            .get(cloud_request_id)
            .cloned()
            .ok_or(RtrError::MissingField("cloud_request_id"))
    }

    async fn check_admin_command_status(
        &self,
        cloud_request_id: &str,
        sequence_id: u32,
    ) -> Result<CommandStatus, RtrError> {
        self.check_command_status(cloud_request_id, sequence_id).await
    }

    async fn check_active_responder_status(
        &self,
        cloud_request_id: &str,
    ) -> Result<CommandStatus, RtrError> {
        self.check_command_status(cloud_request_id, 0).await
    }

    async fn list_session_files(&self, session_id: &str) -> Result<Vec<ExtractedFile>, RtrError> {
        self.record(RtrCall::ListSessionFiles(session_id.to_string()));
        let mut state = self.state.lock();
        if state.session_file_polls_until_visible > 0 {
            state.session_file_polls_until_visible -= 1;
            return Ok(Vec::new());
        }
        Ok(state.session_files.clone())
    }

    async fn get_extracted_file(
        &self,
        _session_id: &str,
        sha256: &str,
        _filename: &str,
    ) -> Result<Vec<u8>, RtrError> {
        self.record(RtrCall::GetExtractedFile {
            sha256: sha256.to_string(),
        });
        let mut state = self.state.lock();
        let Some(content) = state.extracted.get_mut(sha256) else {
            return Err(RtrError::UnknownFile);
        };
        if content.unknown_polls_left > 0 {
            content.unknown_polls_left -= 1;
            return Err(RtrError::UnknownFile);
        }
        Ok(content.bytes.clone())
    }

    async fn list_put_files(&self) -> Result<Vec<String>, RtrError> {
        self.record(RtrCall::ListPutFiles);
        Ok(self.state.lock().put_files.keys().cloned().collect())
    }

    async fn get_put_files(&self, ids: &[String]) -> Result<Vec<CloudFile>, RtrError> {
        self.record(RtrCall::GetPutFiles(ids.to_vec()));
        let state = self.state.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.put_files.get(id).cloned())
            .collect())
    }

    async fn create_put_file(
        &self,
        name: &str,
        _bytes: Vec<u8>,
        _comment: &str,
        _description: &str,
    ) -> Result<(), RtrError> {
        self.record(RtrCall::CreatePutFile(name.to_string()));
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("pf-{}", state.next_id);
        state.put_files.insert(
            id.clone(),
            CloudFile {
                id,
                name: name.to_string(),
                sha256: format!("sha-{name}"),
            },
        );
        *state.put_file_uploads.entry(name.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn delete_put_file(&self, id: &str) -> Result<(), RtrError> {
        self.record(RtrCall::DeletePutFile(id.to_string()));
        let mut state = self.state.lock();
        if state.put_files.remove(id).is_none() {
            return Err(RtrError::Api {
                code: 404,
                message: "put-file not found".to_string(),
            });
        }
        Ok(())
    }

    async fn batch_init_sessions(&self, device_ids: &[String]) -> Result<BatchSession, RtrError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let batch_id = format!("batch-{}", state.next_id);
        let mut sessions = HashMap::new();
        for aid in device_ids {
            state.next_id += 1;
            let session_id = format!("sess-{}", state.next_id);
            state.open_sessions.push(session_id.clone());
            sessions.insert(aid.clone(), session_id);
        }
        Ok(BatchSession { batch_id, sessions })
    }

    async fn batch_refresh_sessions(&self, _batch_id: &str) -> Result<(), RtrError> {
        Ok(())
    }

    async fn batch_command(
        &self,
        _batch_id: &str,
        _base_command: &str,
        command_string: &str,
    ) -> Result<HashMap<String, CommandStatus>, RtrError> {
        let _ = self.submit(command_string);
        Ok(HashMap::new())
    }

    async fn batch_get_command(
        &self,
        _batch_id: &str,
        _file_path: &str,
    ) -> Result<String, RtrError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        Ok(format!("batchreq-{}", state.next_id))
    }

    async fn batch_get_command_status(
        &self,
        _batch_req_id: &str,
    ) -> Result<HashMap<String, ExtractedFile>, RtrError> {
        Ok(HashMap::new())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
