// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake runner target for testing

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ForgeError, RemoteTarget, RunnerEntry};
use crate::token::RegistrationToken;

/// One scripted enumeration cycle: the pages `list_runners` serves, in
/// order, before the cycle repeats from its last entry.
type Pages = Vec<Vec<RunnerEntry>>;

struct FakeState {
    /// Queue of page sets; each `list_runners` sweep consumes the front
    /// entry, the last set sticks.
    cycles: VecDeque<Pages>,
    current: Pages,
    /// Errors injected ahead of successful list pages.
    list_errors: VecDeque<ForgeError>,
    /// Errors injected ahead of successful deletes.
    delete_errors: VecDeque<ForgeError>,
    token_errors: VecDeque<ForgeError>,
    deleted: Vec<i64>,
    tokens_created: u32,
    token_ttl: Duration,
}

/// Scripted in-memory target for tests.
#[derive(Clone)]
pub struct FakeTarget {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeTarget {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                cycles: VecDeque::new(),
                current: vec![Vec::new()],
                list_errors: VecDeque::new(),
                delete_errors: VecDeque::new(),
                token_errors: VecDeque::new(),
                deleted: Vec::new(),
                tokens_created: 0,
                token_ttl: Duration::from_secs(3600),
            })),
        }
    }
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the pages served by the next enumeration sweep.
    pub fn push_pages(&self, pages: Pages) {
        self.inner.lock().cycles.push_back(pages);
    }

    /// Script a single-page enumeration sweep.
    pub fn push_runners(&self, runners: Vec<RunnerEntry>) {
        self.push_pages(vec![runners]);
    }

    /// Inject an error before the next successful list page.
    pub fn fail_next_list(&self, message: &str) {
        self.inner
            .lock()
            .list_errors
            .push_back(ForgeError::Unavailable(message.to_string()));
    }

    /// Inject an error before the next successful delete.
    pub fn fail_next_delete(&self, message: &str) {
        self.inner
            .lock()
            .delete_errors
            .push_back(ForgeError::Unavailable(message.to_string()));
    }

    /// Inject an error before the next successful token creation.
    pub fn fail_next_token(&self, message: &str) {
        self.inner
            .lock()
            .token_errors
            .push_back(ForgeError::Unavailable(message.to_string()));
    }

    /// Lifetime of tokens minted by `create_registration_token`.
    pub fn set_token_ttl(&self, ttl: Duration) {
        self.inner.lock().token_ttl = ttl;
    }

    /// IDs passed to `delete_runner`, in call order.
    pub fn deleted(&self) -> Vec<i64> {
        self.inner.lock().deleted.clone()
    }

    /// Number of tokens minted so far.
    pub fn tokens_created(&self) -> u32 {
        self.inner.lock().tokens_created
    }
}

#[async_trait]
impl RemoteTarget for FakeTarget {
    fn url(&self) -> String {
        "https://github.com/acme/widgets".to_string()
    }

    async fn list_runners(
        &self,
        page: u32,
        _page_size: u8,
    ) -> Result<(Vec<RunnerEntry>, u32), ForgeError> {
        let mut state = self.inner.lock();
        if let Some(err) = state.list_errors.pop_front() {
            return Err(err);
        }

        // A fresh sweep starts at page 1: advance to the next scripted cycle.
        if page == 1 {
            if let Some(next) = state.cycles.pop_front() {
                state.current = next;
            }
        }

        let index = page.saturating_sub(1) as usize;
        let entries = state.current.get(index).cloned().unwrap_or_default();
        let next = if (index + 1) < state.current.len() {
            page + 1
        } else {
            0
        };
        Ok((entries, next))
    }

    async fn create_registration_token(&self) -> Result<RegistrationToken, ForgeError> {
        let mut state = self.inner.lock();
        if let Some(err) = state.token_errors.pop_front() {
            return Err(err);
        }
        state.tokens_created += 1;
        Ok(RegistrationToken {
            value: format!("reg-token-{}", state.tokens_created),
            expires_at: SystemTime::now() + state.token_ttl,
        })
    }

    async fn delete_runner(&self, id: i64) -> Result<(), ForgeError> {
        let mut state = self.inner.lock();
        if let Some(err) = state.delete_errors.pop_front() {
            return Err(err);
        }
        state.deleted.push(id);
        Ok(())
    }
}
