// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration-token cache with coalesced refresh.
//!
//! Registration tokens are short-lived; every agent register call needs
//! one. The cache hands out the current token until it nears expiry and
//! then lets exactly one caller refresh it, no matter how many arrive
//! concurrently.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;

use crate::target::{ForgeError, RemoteTarget};

/// Remaining lifetime below which a token is considered stale.
pub const RENEW_THRESHOLD: Duration = Duration::from_secs(60);

/// A registration token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationToken {
    pub value: String,
    pub expires_at: SystemTime,
}

impl RegistrationToken {
    /// Whether the token must be refreshed before being handed out.
    pub fn needs_renewal(&self) -> bool {
        match self.expires_at.duration_since(SystemTime::now()) {
            Ok(remaining) => remaining <= RENEW_THRESHOLD,
            // Expiry is already in the past.
            Err(_) => true,
        }
    }
}

/// Shared cache over the target's `create_registration_token`.
#[derive(Clone)]
pub struct TokenCache {
    target: Arc<dyn RemoteTarget>,
    token: Arc<RwLock<Option<RegistrationToken>>>,
}

impl TokenCache {
    pub fn new(target: Arc<dyn RemoteTarget>) -> Self {
        Self {
            target,
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Current registration token, refreshed if stale.
    ///
    /// The fast path reads under shared access. When a refresh is
    /// needed, callers serialize on the write lock and re-check the
    /// freshness predicate, so concurrent callers trigger at most one
    /// fetch. A failed fetch leaves the previous token (possibly
    /// expired) in place for the next caller to retry.
    pub async fn get(&self) -> Result<RegistrationToken, ForgeError> {
        {
            let token = self.token.read().await;
            if let Some(token) = token.as_ref() {
                if !token.needs_renewal() {
                    return Ok(token.clone());
                }
            }
        }

        let mut slot = self.token.write().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = slot.as_ref() {
            if !token.needs_renewal() {
                return Ok(token.clone());
            }
        }

        tracing::debug!("refreshing registration token");
        let fresh = self.target.create_registration_token().await?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }

    /// Seed the cache, bypassing the target. Test hook.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn seed(&self, token: RegistrationToken) {
        *self.token.write().await = Some(token);
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
