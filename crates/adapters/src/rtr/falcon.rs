// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production control-plane client over the vendor REST surface.

use crate::rtr::retry::with_backoff;
use crate::rtr::types::{
    BatchSession, CommandResource, CommandStatus, DeviceDetails, Envelope, PutFileResource,
    SessionFileResource, SessionHandle, SessionResource,
};
use crate::rtr::{CloudClient, RtrError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use triage_config::Credentials;
use triage_core::{CloudFile, ExtractedFile};

const DEFAULT_BASE_URL: &str = "https://api.crowdstrike.com";
// Refresh slightly before the advertised expiry to avoid a 401 race.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    member_cid: Option<String>,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

/// Control-plane client scoped to one tenant.
///
/// Cheap to clone; clones share the HTTP connection pool and the cached
/// OAuth2 token.
#[derive(Clone)]
pub struct FalconClient {
    inner: Arc<Inner>,
}

impl FalconClient {
    pub fn new(credentials: Credentials, member_cid: Option<String>) -> Self {
        Self::with_base_url(credentials, member_cid, DEFAULT_BASE_URL)
    }

    /// Override the API origin (S3-compatible test servers, gov clouds).
    pub fn with_base_url(
        credentials: Credentials,
        member_cid: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                base_url: base_url.into(),
                credentials,
                member_cid,
                token: tokio::sync::Mutex::new(None),
            }),
        }
    }

    async fn bearer_token(&self) -> Result<String, RtrError> {
        let mut guard = self.inner.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        let mut form = vec![
            ("client_id", self.inner.credentials.client_id.clone()),
            ("client_secret", self.inner.credentials.client_secret.clone()),
        ];
        if let Some(cid) = &self.inner.member_cid {
            form.push(("member_cid", cid.clone()));
        }

        let response = self
            .inner
            .http
            .post(format!("{}/oauth2/token", self.inner.base_url))
            .form(&form)
            .send()
            .await
            .map_err(|err| RtrError::Transport(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RtrError::Auth(format!("token request rejected: {status}")));
        }
        if !status.is_success() {
            return Err(RtrError::Api {
                code: status.as_u16(),
                message: "token request failed".to_string(),
            });
        }

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default)]
            expires_in: u64,
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| RtrError::Transport(err.to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in.max(60));
        let cached = CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + lifetime - TOKEN_EXPIRY_MARGIN,
        };
        let access = cached.access_token.clone();
        *guard = Some(cached);
        Ok(access)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, RtrError> {
        let token = self.bearer_token().await?;
        let mut request = self
            .inner
            .http
            .request(method, format!("{}{}", self.inner.base_url, path))
            .bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| RtrError::Transport(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RtrError::Auth(format!("{path} rejected: {status}")));
        }
        Ok(response)
    }

    /// Issue a request and decode the standard envelope, retrying
    /// transient transport failures.
    async fn call<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<Envelope<T>, RtrError> {
        with_backoff(path, || async {
            let response = self
                .send(method.clone(), path, query, body.as_ref())
                .await?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|err| RtrError::Transport(err.to_string()))?;
            let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|err| {
                RtrError::Transport(format!("malformed response from {path}: {err}"))
            })?;
            if !status.is_success() {
                let message = envelope
                    .errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| format!("{path} returned {status}"));
                return Err(RtrError::Api {
                    code: status.as_u16(),
                    message,
                });
            }
            Ok(envelope)
        })
        .await
    }

    fn first_resource<T>(mut envelope: Envelope<T>, field: &'static str) -> Result<T, RtrError> {
        if envelope.resources.is_empty() {
            if let Some(err) = envelope.errors.first() {
                return Err(RtrError::Api {
                    code: err.code,
                    message: err.message.clone(),
                });
            }
            return Err(RtrError::MissingField(field));
        }
        Ok(envelope.resources.remove(0))
    }

    fn status_from(resource: CommandResource) -> CommandStatus {
        CommandStatus {
            complete: resource.complete,
            stdout: resource.stdout,
            stderr: resource.stderr,
        }
    }

    async fn submit_command(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<String, RtrError> {
        let envelope: Envelope<CommandResource> = self
            .call(reqwest::Method::POST, path, &[], Some(body))
            .await?;
        let resource = Self::first_resource(envelope, "cloud_request_id")?;
        if resource.cloud_request_id.is_empty() {
            return Err(RtrError::MissingField("cloud_request_id"));
        }
        Ok(resource.cloud_request_id)
    }

    async fn poll_command(
        &self,
        path: &str,
        cloud_request_id: &str,
        sequence_id: u32,
    ) -> Result<CommandStatus, RtrError> {
        let seq = sequence_id.to_string();
        let envelope: Envelope<CommandResource> = self
            .call(
                reqwest::Method::GET,
                path,
                &[("cloud_request_id", cloud_request_id), ("sequence_id", &seq)],
                None,
            )
            .await?;
        Ok(Self::status_from(Self::first_resource(
            envelope,
            "command status",
        )?))
    }
}

#[async_trait]
impl CloudClient for FalconClient {
    async fn query_hosts(&self, filter: &str) -> Result<Vec<String>, RtrError> {
        let envelope: Envelope<String> = self
            .call(
                reqwest::Method::GET,
                "/devices/queries/devices/v1",
                &[("filter", filter), ("limit", "100")],
                None,
            )
            .await?;
        Ok(envelope.resources)
    }

    async fn get_host_details(&self, aids: &[String]) -> Result<Vec<DeviceDetails>, RtrError> {
        let envelope: Envelope<DeviceDetails> = self
            .call(
                reqwest::Method::POST,
                "/devices/entities/devices/v2",
                &[],
                Some(json!({ "ids": aids })),
            )
            .await?;
        Ok(envelope.resources)
    }

    async fn init_session(&self, device_id: &str) -> Result<SessionHandle, RtrError> {
        let body = json!({ "device_id": device_id, "queue_offline": false });
        let envelope: Envelope<serde_json::Value> = self
            .call(
                reqwest::Method::POST,
                "/real-time-response/entities/sessions/v1",
                &[],
                Some(body),
            )
            .await?;
        let raw = Self::first_resource(envelope, "session resource")?;
        let resource: SessionResource = serde_json::from_value(raw.clone())
            .map_err(|_| RtrError::MissingField("session_id"))?;
        if resource.session_id.is_empty() {
            return Err(RtrError::MissingField("session_id"));
        }
        Ok(SessionHandle {
            session_id: resource.session_id,
            created: true,
            raw,
        })
    }

    async fn pulse_session(&self, device_id: &str) -> Result<(), RtrError> {
        let body = json!({ "device_id": device_id });
        let _: Envelope<serde_json::Value> = self
            .call(
                reqwest::Method::POST,
                "/real-time-response/entities/refresh-session/v1",
                &[],
                Some(body),
            )
            .await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), RtrError> {
        let response = self
            .send(
                reqwest::Method::DELETE,
                "/real-time-response/entities/sessions/v1",
                &[("session_id", session_id)],
                None,
            )
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RtrError::Api {
                code: status.as_u16(),
                message: "session delete failed".to_string(),
            });
        }
        Ok(())
    }

    async fn execute_command(
        &self,
        session_id: &str,
        base_command: &str,
        command_string: &str,
    ) -> Result<String, RtrError> {
        self.submit_command(
            "/real-time-response/entities/command/v1",
            json!({
                "session_id": session_id,
                "base_command": base_command,
                "command_string": command_string,
            }),
        )
        .await
    }

    async fn execute_admin_command(
        &self,
        session_id: &str,
        base_command: &str,
        command_string: &str,
    ) -> Result<String, RtrError> {
        self.submit_command(
            "/real-time-response/entities/admin-command/v1",
            json!({
                "session_id": session_id,
                "base_command": base_command,
                "command_string": command_string,
            }),
        )
        .await
    }

    async fn execute_active_responder(
        &self,
        base_command: &str,
        command_string: &str,
        device_id: &str,
        session_id: &str,
    ) -> Result<String, RtrError> {
        self.submit_command(
            "/real-time-response/entities/active-responder-command/v1",
            json!({
                "base_command": base_command,
                "command_string": command_string,
                "device_id": device_id,
                "session_id": session_id,
            }),
        )
        .await
    }

    async fn check_command_status(
        &self,
        cloud_request_id: &str,
        sequence_id: u32,
    ) -> Result<CommandStatus, RtrError> {
        self.poll_command(
            "/real-time-response/entities/command/v1",
            cloud_request_id,
            sequence_id,
        )
        .await
    }

    async fn check_admin_command_status(
        &self,
        cloud_request_id: &str,
        sequence_id: u32,
    ) -> Result<CommandStatus, RtrError> {
        self.poll_command(
            "/real-time-response/entities/admin-command/v1",
            cloud_request_id,
            sequence_id,
        )
        .await
    }

    async fn check_active_responder_status(
        &self,
        cloud_request_id: &str,
    ) -> Result<CommandStatus, RtrError> {
        self.poll_command(
            "/real-time-response/entities/active-responder-command/v1",
            cloud_request_id,
            0,
        )
        .await
    }

    async fn list_session_files(&self, session_id: &str) -> Result<Vec<ExtractedFile>, RtrError> {
        let envelope: Envelope<SessionFileResource> = self
            .call(
                reqwest::Method::GET,
                "/real-time-response/entities/file/v2",
                &[("session_id", session_id)],
                None,
            )
            .await?;
        Ok(envelope
            .resources
            .into_iter()
            .map(|file| ExtractedFile {
                sha256: file.sha256,
                size: file.size,
                cloud_request_id: file.cloud_request_id,
                filename: file.filename,
            })
            .collect())
    }

    async fn get_extracted_file(
        &self,
        session_id: &str,
        sha256: &str,
        filename: &str,
    ) -> Result<Vec<u8>, RtrError> {
        let response = self
            .send(
                reqwest::Method::GET,
                "/real-time-response/entities/extracted-file-contents/v1",
                &[
                    ("session_id", session_id),
                    ("sha256", sha256),
                    ("filename", filename),
                ],
                None,
            )
            .await?;

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| RtrError::Transport(err.to_string()))?;

        if is_json || !status.is_success() {
            // Error body instead of content. "Unknown file" means ingestion
            // is still running and the caller should keep polling.
            let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&bytes)
                .map_err(|err| RtrError::Transport(format!("malformed error body: {err}")))?;
            let message = envelope
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            if message == "Unknown file" {
                return Err(RtrError::UnknownFile);
            }
            return Err(RtrError::Api {
                code: status.as_u16(),
                message,
            });
        }
        Ok(bytes.to_vec())
    }

    async fn list_put_files(&self) -> Result<Vec<String>, RtrError> {
        let envelope: Envelope<String> = self
            .call(
                reqwest::Method::GET,
                "/real-time-response/queries/put-files/v1",
                &[],
                None,
            )
            .await?;
        Ok(envelope.resources)
    }

    async fn get_put_files(&self, ids: &[String]) -> Result<Vec<CloudFile>, RtrError> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        let envelope: Envelope<PutFileResource> = self
            .call(
                reqwest::Method::GET,
                "/real-time-response/entities/put-files/v2",
                &query,
                None,
            )
            .await?;
        Ok(envelope
            .resources
            .into_iter()
            .map(|file| CloudFile {
                id: file.id,
                name: file.name,
                sha256: file.sha256,
            })
            .collect())
    }

    async fn create_put_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
        comment: &str,
        description: &str,
    ) -> Result<(), RtrError> {
        let token = self.bearer_token().await?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|err| RtrError::Transport(err.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("name", name.to_string())
            .text("description", description.to_string())
            .text("comments_for_audit_log", comment.to_string());

        let response = self
            .inner
            .http
            .post(format!(
                "{}/real-time-response/entities/put-files/v1",
                self.inner.base_url
            ))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|err| RtrError::Transport(err.to_string()))?;

        let status = response.status();
        let envelope: Envelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|err| RtrError::Transport(err.to_string()))?;
        if let Some(err) = envelope.errors.first() {
            return Err(RtrError::Api {
                code: err.code,
                message: err.message.clone(),
            });
        }
        let affected = envelope
            .meta
            .and_then(|m| m.writes)
            .map(|w| w.resources_affected)
            .unwrap_or(0);
        if !status.is_success() || affected != 1 {
            return Err(RtrError::Api {
                code: status.as_u16(),
                message: format!("put-file upload affected {affected} resources"),
            });
        }
        Ok(())
    }

    async fn delete_put_file(&self, id: &str) -> Result<(), RtrError> {
        let envelope: Envelope<serde_json::Value> = self
            .call(
                reqwest::Method::DELETE,
                "/real-time-response/entities/put-files/v1",
                &[("ids", id)],
                None,
            )
            .await?;
        let affected = envelope
            .meta
            .and_then(|m| m.writes)
            .map(|w| w.resources_affected)
            .unwrap_or(0);
        if affected != 1 {
            return Err(RtrError::Api {
                code: 409,
                message: format!("put-file delete affected {affected} resources"),
            });
        }
        Ok(())
    }

    async fn batch_init_sessions(&self, device_ids: &[String]) -> Result<BatchSession, RtrError> {
        let body = json!({ "host_ids": device_ids, "queue_offline": false });
        let response = self
            .send(
                reqwest::Method::POST,
                "/real-time-response/combined/batch-init-session/v1",
                &[],
                Some(&body),
            )
            .await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| RtrError::Transport(err.to_string()))?;
        let batch_id = value
            .get("batch_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(RtrError::MissingField("batch_id"))?
            .to_string();

        let mut sessions = HashMap::new();
        if let Some(resources) = value.get("resources").and_then(|v| v.as_object()) {
            for (aid, resource) in resources {
                if let Ok(session) =
                    serde_json::from_value::<SessionResource>(resource.clone())
                {
                    if !session.session_id.is_empty() {
                        sessions.insert(aid.clone(), session.session_id);
                    }
                }
            }
        }
        Ok(BatchSession { batch_id, sessions })
    }

    async fn batch_refresh_sessions(&self, batch_id: &str) -> Result<(), RtrError> {
        let body = json!({ "batch_id": batch_id });
        let _: Envelope<serde_json::Value> = self
            .call(
                reqwest::Method::POST,
                "/real-time-response/combined/batch-refresh-session/v1",
                &[],
                Some(body),
            )
            .await?;
        Ok(())
    }

    async fn batch_command(
        &self,
        batch_id: &str,
        base_command: &str,
        command_string: &str,
    ) -> Result<HashMap<String, CommandStatus>, RtrError> {
        let body = json!({
            "batch_id": batch_id,
            "base_command": base_command,
            "command_string": command_string,
        });
        let response = self
            .send(
                reqwest::Method::POST,
                "/real-time-response/combined/batch-command/v1",
                &[],
                Some(&body),
            )
            .await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| RtrError::Transport(err.to_string()))?;
        let mut statuses = HashMap::new();
        if let Some(combined) = value
            .get("combined")
            .and_then(|v| v.get("resources"))
            .and_then(|v| v.as_object())
        {
            for (aid, resource) in combined {
                if let Ok(command) =
                    serde_json::from_value::<CommandResource>(resource.clone())
                {
                    statuses.insert(aid.clone(), Self::status_from(command));
                }
            }
        }
        Ok(statuses)
    }

    async fn batch_get_command(
        &self,
        batch_id: &str,
        file_path: &str,
    ) -> Result<String, RtrError> {
        let body = json!({ "batch_id": batch_id, "file_path": file_path });
        let response = self
            .send(
                reqwest::Method::POST,
                "/real-time-response/combined/batch-get-command/v1",
                &[],
                Some(&body),
            )
            .await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| RtrError::Transport(err.to_string()))?;
        value
            .get("batch_get_cmd_req_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or(RtrError::MissingField("batch_get_cmd_req_id"))
    }

    async fn batch_get_command_status(
        &self,
        batch_req_id: &str,
    ) -> Result<HashMap<String, ExtractedFile>, RtrError> {
        let envelope: Envelope<serde_json::Value> = self
            .call(
                reqwest::Method::GET,
                "/real-time-response/combined/batch-get-command/v1",
                &[("batch_get_cmd_req_id", batch_req_id)],
                None,
            )
            .await?;
        let mut files = HashMap::new();
        for resource in envelope.resources {
            let Some(map) = resource.as_object() else {
                continue;
            };
            for (aid, entry) in map {
                if let Ok(file) = serde_json::from_value::<SessionFileResource>(entry.clone()) {
                    if !file.sha256.is_empty() {
                        files.insert(
                            aid.clone(),
                            ExtractedFile {
                                sha256: file.sha256,
                                size: file.size,
                                cloud_request_id: file.cloud_request_id,
                                filename: file.filename,
                            },
                        );
                    }
                }
            }
        }
        Ok(files)
    }
}

/// Per-tenant client cache.
///
/// RTR requires tenant-scoped client context; the factory hands out one
/// initialized client per customer-id and reuses it across batch workers.
pub struct ClientFactory {
    credentials: Credentials,
    base_url: String,
    clients: parking_lot::Mutex<HashMap<String, FalconClient>>,
}

impl ClientFactory {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_base_url(credentials, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(credentials: Credentials, base_url: impl Into<String>) -> Self {
        Self {
            credentials,
            base_url: base_url.into(),
            clients: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Client for one customer-id, created on first use.
    pub fn for_cid(&self, cid: &str) -> FalconClient {
        let mut clients = self.clients.lock();
        clients
            .entry(cid.to_string())
            .or_insert_with(|| {
                FalconClient::with_base_url(
                    self.credentials.clone(),
                    Some(cid.to_string()),
                    self.base_url.clone(),
                )
            })
            .clone()
    }
}
