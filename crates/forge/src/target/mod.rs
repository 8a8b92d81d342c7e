// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner-target abstraction over the forge's self-hosted runner API.
//!
//! A target is either a repository or an organization; both expose the
//! same four operations and are dispatched from the configured URL.

mod org;
mod repo;

pub use org::OrganizationTarget;
pub use repo::RepositoryTarget;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeTarget;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::token::RegistrationToken;

/// Errors from forge API operations.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("unsupported forge URL: {0}")]
    UnsupportedUrl(String),

    #[error("forge API error: {0}")]
    Api(#[from] octocrab::Error),

    #[error("forge unavailable: {0}")]
    Unavailable(String),
}

/// One registration visible at the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerEntry {
    pub id: i64,
    pub name: String,
    /// Raw status string as reported by the forge (`"online"`, `"offline"`).
    pub status: String,
}

impl RunnerEntry {
    pub fn new(id: i64, name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: status.into(),
        }
    }
}

/// A forge endpoint runners can register against.
#[async_trait]
pub trait RemoteTarget: Send + Sync {
    /// Canonical forge URL for this target, shipped to agents as a label.
    fn url(&self) -> String;

    /// One page of the registered-runner list.
    ///
    /// Returns the entries and the next page number, `0` when the
    /// enumeration is exhausted.
    async fn list_runners(
        &self,
        page: u32,
        page_size: u8,
    ) -> Result<(Vec<RunnerEntry>, u32), ForgeError>;

    /// Issue a short-lived token an agent can register itself with.
    async fn create_registration_token(&self) -> Result<RegistrationToken, ForgeError>;

    /// Remove a registration by its forge-assigned ID.
    ///
    /// A registration that is already gone counts as success.
    async fn delete_runner(&self, id: i64) -> Result<(), ForgeError>;
}

impl std::fmt::Debug for dyn RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RemoteTarget").field(&self.url()).finish()
    }
}

/// Dispatch a target from its configured URL.
///
/// `https://github.com/<owner>/<repo>` selects a repository target,
/// `https://github.com/<org>` an organization target.
pub fn from_url(url: &str, client: Octocrab) -> Result<Box<dyn RemoteTarget>, ForgeError> {
    let repo = Regex::new(r"^https://github\.com/([^/]+)/([^/]+)/?$")
        .map_err(|_| ForgeError::UnsupportedUrl(url.to_string()))?;
    let org = Regex::new(r"^https://github\.com/([^/]+)/?$")
        .map_err(|_| ForgeError::UnsupportedUrl(url.to_string()))?;

    if let Some(m) = repo.captures(url) {
        return Ok(Box::new(RepositoryTarget::new(client, &m[1], &m[2])));
    }
    if let Some(m) = org.captures(url) {
        return Ok(Box::new(OrganizationTarget::new(client, &m[1])));
    }
    Err(ForgeError::UnsupportedUrl(url.to_string()))
}

/// Wire shape of one page of the runner list.
#[derive(Debug, Deserialize)]
pub(crate) struct RunnersPage {
    pub total_count: u64,
    pub runners: Vec<ApiRunner>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRunner {
    pub id: i64,
    pub name: String,
    pub status: String,
}

/// Wire shape of a created registration token.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiRegistrationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Next page number after `page`, `0` once `total_count` is covered.
pub(crate) fn next_page(page: u32, page_size: u8, total_count: u64) -> u32 {
    if u64::from(page) * u64::from(page_size) < total_count {
        page + 1
    } else {
        0
    }
}

/// Shared GET over one page of `{base}/actions/runners`.
pub(crate) async fn list_page(
    client: &Octocrab,
    base: &str,
    page: u32,
    page_size: u8,
) -> Result<(Vec<RunnerEntry>, u32), ForgeError> {
    let route = format!(
        "/{}/actions/runners?per_page={}&page={}",
        base, page_size, page
    );
    let body: RunnersPage = client.get(route, None::<&()>).await?;

    let entries = body
        .runners
        .into_iter()
        .map(|r| RunnerEntry {
            id: r.id,
            name: r.name,
            status: r.status,
        })
        .collect();

    Ok((entries, next_page(page, page_size, body.total_count)))
}

/// Shared POST to `{base}/actions/runners/registration-token`.
pub(crate) async fn create_token(
    client: &Octocrab,
    base: &str,
) -> Result<RegistrationToken, ForgeError> {
    let route = format!("/{}/actions/runners/registration-token", base);
    let body: ApiRegistrationToken = client.post(route, None::<&()>).await?;

    Ok(RegistrationToken {
        value: body.token,
        expires_at: body.expires_at.into(),
    })
}

/// Collapse the forge's 404 on delete into success: the registration
/// being gone already is the outcome the caller wanted.
pub(crate) fn not_found_is_ok(result: octocrab::Result<()>) -> Result<(), ForgeError> {
    match result {
        Ok(()) => Ok(()),
        Err(octocrab::Error::GitHub { source, .. }) if source.status_code.as_u16() == 404 => {
            Ok(())
        }
        Err(e) => Err(ForgeError::Api(e)),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
