// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forge-side collaborators for the runner coordinator.
//!
//! Everything the coordinator needs from the hosted CI provider goes
//! through this crate: client construction from the configured auth
//! method, the [`RemoteTarget`] abstraction over repository- and
//! organization-scoped runner APIs, and the shared registration-token
//! cache.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod auth;
pub mod target;
pub mod token;

pub use auth::{AuthConfig, AuthError};
pub use target::{ForgeError, RemoteTarget, RunnerEntry};
pub use token::{RegistrationToken, TokenCache, RENEW_THRESHOLD};

#[cfg(any(test, feature = "test-support"))]
pub use target::FakeTarget;
