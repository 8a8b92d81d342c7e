// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forge client construction from the configured auth method.

use std::path::PathBuf;

use jsonwebtoken::EncodingKey;
use octocrab::models::{AppId, InstallationId};
use octocrab::Octocrab;
use serde::Deserialize;
use thiserror::Error;

/// Errors from building an authenticated forge client.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cannot read private key {path}: {source}")]
    PrivateKey {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid private key: {0}")]
    InvalidKey(#[from] jsonwebtoken::errors::Error),

    #[error("cannot build client: {0}")]
    Client(#[from] octocrab::Error),
}

/// App-keyed installation credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAuthConfig {
    pub app_id: u64,
    pub installation_id: u64,
    pub private_key_path: PathBuf,
}

/// Auth method for the forge, tagged by `type` in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AuthConfig {
    /// Static personal access token.
    Token { token: String },
    /// App credentials scoped to one installation.
    App { app: AppAuthConfig },
}

impl AuthConfig {
    /// Build an authenticated client for this auth method.
    ///
    /// App auth reads the RSA private key from disk and scopes the
    /// client to the configured installation. All failures here are
    /// startup-fatal for the coordinator.
    pub fn create_client(&self) -> Result<Octocrab, AuthError> {
        match self {
            AuthConfig::Token { token } => {
                Ok(Octocrab::builder().personal_token(token.clone()).build()?)
            }
            AuthConfig::App { app } => {
                let pem =
                    std::fs::read(&app.private_key_path).map_err(|source| AuthError::PrivateKey {
                        path: app.private_key_path.clone(),
                        source,
                    })?;
                let key = EncodingKey::from_rsa_pem(&pem)?;
                let client = Octocrab::builder()
                    .app(AppId(app.app_id), key)
                    .build()?;
                Ok(client.installation(InstallationId(app.installation_id))?)
            }
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
