// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy.

use std::time::Duration;
use thiserror::Error;
use triage_adapters::{RtrError, StoreError};

/// Errors from the collection engine.
///
/// The named variants are the per-host outcome taxonomy; `Cloud`/`Store`
/// carry adapter failures that did not reach a taxonomy decision point.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("host not found: {0}")]
    NotFound(String),
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("session lost: {0}")]
    SessionLost(String),
    #[error("command timed out after {elapsed:?}: {context}")]
    CommandTimeout { context: String, elapsed: Duration },
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("collector failed: {0}")]
    CollectorFailed(String),
    #[error("transfer failed: {0}")]
    TransferFailed(String),
    #[error("remote command error: {stderr}")]
    RemoteError { stderr: String },
    #[error("control plane error: {0}")]
    Cloud(#[from] RtrError),
    #[error("object storage error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Credential rejection anywhere is fatal for the whole process, not
    /// just the current host.
    pub fn is_fatal_auth(&self) -> bool {
        matches!(
            self,
            EngineError::AuthFailed(_)
                | EngineError::Cloud(RtrError::Auth(_))
                | EngineError::Store(StoreError::Auth(_))
        )
    }
}
