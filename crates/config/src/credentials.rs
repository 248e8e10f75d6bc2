// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane API credentials.

use crate::config::ConfigError;

const CLIENT_ID_ENV: &str = "FALCON_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "FALCON_CLIENT_SECRET";

/// OAuth2 client-credentials pair for the control plane.
///
/// Object-storage credentials are not handled here; they resolve through
/// the standard AWS environment chain.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    /// Read `FALCON_CLIENT_ID` / `FALCON_CLIENT_SECRET` from the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id = std::env::var(CLIENT_ID_ENV)
            .map_err(|_| ConfigError::MissingCredentials(CLIENT_ID_ENV))?;
        let client_secret = std::env::var(CLIENT_SECRET_ENV)
            .map_err(|_| ConfigError::MissingCredentials(CLIENT_SECRET_ENV))?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

// Manual impl so the secret never lands in logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
