// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository-scoped runner target

use async_trait::async_trait;
use octocrab::models::RunnerId;
use octocrab::Octocrab;

use super::{ForgeError, RemoteTarget, RunnerEntry};
use crate::token::RegistrationToken;

/// Target bound to one repository's self-hosted runners.
pub struct RepositoryTarget {
    client: Octocrab,
    owner: String,
    name: String,
}

impl RepositoryTarget {
    pub fn new(client: Octocrab, owner: &str, name: &str) -> Self {
        Self {
            client,
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    fn base(&self) -> String {
        format!("repos/{}/{}", self.owner, self.name)
    }
}

#[async_trait]
impl RemoteTarget for RepositoryTarget {
    fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }

    async fn list_runners(
        &self,
        page: u32,
        page_size: u8,
    ) -> Result<(Vec<RunnerEntry>, u32), ForgeError> {
        super::list_page(&self.client, &self.base(), page, page_size).await
    }

    async fn create_registration_token(&self) -> Result<RegistrationToken, ForgeError> {
        super::create_token(&self.client, &self.base()).await
    }

    async fn delete_runner(&self, id: i64) -> Result<(), ForgeError> {
        let result = self
            .client
            .actions()
            .delete_repo_runner(self.owner.as_str(), self.name.as_str(), RunnerId(id as u64))
            .await;
        super::not_found_is_ok(result)
    }
}
