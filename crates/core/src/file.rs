// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane file records.

use serde::{Deserialize, Serialize};

/// A file hosted in the control plane's put-file repository.
///
/// Names are unique within a customer-id scope; re-upload requires a prior
/// delete by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sha256: String,
}

/// A file retrieved from an endpoint by an active-responder `get`.
///
/// Keyed by sha256 within a session. The content becomes fetchable only
/// after the control plane finishes ingesting it, which can take tens of
/// minutes for multi-GB archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFile {
    pub sha256: String,
    #[serde(default)]
    pub size: Option<u64>,
    pub cloud_request_id: String,
    pub filename: String,
}
