// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the coordinator crate.

use std::time::Duration;

/// Synchronizer cadence override (`CORRAL_SYNC_INTERVAL_MS`).
pub fn sync_interval() -> Duration {
    env_ms("CORRAL_SYNC_INTERVAL_MS").unwrap_or(crate::synchronizer::SYNC_INTERVAL)
}

/// `/wait` long-poll window override (`CORRAL_WAIT_TIMEOUT_MS`).
pub fn wait_timeout() -> Duration {
    env_ms("CORRAL_WAIT_TIMEOUT_MS").unwrap_or(crate::server::WAIT_TIMEOUT)
}

fn env_ms(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}
