// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote registration list mirroring.
//!
//! The synchronizer enumerates the forge's runner list on a fixed
//! cadence and publishes each complete enumeration as an immutable
//! snapshot tagged by a strictly-increasing epoch. A cycle that cannot
//! fetch every page publishes nothing and is retried on the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use corral_forge::{ForgeError, RemoteTarget};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Enumeration cadence.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Page size requested from the forge.
pub const SYNC_PAGE_SIZE: u8 = 100;

/// One registration visible at the forge at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRunner {
    pub id: i64,
    pub name: String,
    pub is_online: bool,
}

/// Immutable snapshot of the remote registration list.
#[derive(Debug, Clone)]
pub struct RemoteRunners {
    /// Strictly increasing per published snapshot, starting at 1.
    pub epoch: i64,
    /// When this enumeration began; used for timeout log lines only.
    pub begin_time: Instant,
    pub runners: HashMap<String, RemoteRunner>,
}

impl RemoteRunners {
    /// Pre-first-snapshot placeholder at epoch 0.
    pub fn empty() -> Self {
        Self {
            epoch: 0,
            begin_time: Instant::now(),
            runners: HashMap::new(),
        }
    }

    /// Match a local runner's identity against this snapshot.
    ///
    /// An empty name never matches. A zero local ID matches by name
    /// alone (the agent has not yet reported its forge ID).
    pub fn lookup(&self, name: &str, id: i64) -> Option<&RemoteRunner> {
        if name.is_empty() {
            return None;
        }
        self.runners
            .get(name)
            .filter(|runner| runner.id == id || id == 0)
    }
}

/// Periodic full enumeration of the forge's runner list.
pub struct Synchronizer {
    target: Arc<dyn RemoteTarget>,
    interval: Duration,
}

impl Synchronizer {
    pub fn new(target: Arc<dyn RemoteTarget>) -> Self {
        Self::with_interval(target, crate::env::sync_interval())
    }

    pub fn with_interval(target: Arc<dyn RemoteTarget>, interval: Duration) -> Self {
        Self { target, interval }
    }

    /// Run until cancelled, publishing snapshots on `out`.
    ///
    /// The sender is dropped on exit, closing the channel. The monitor
    /// owns this task's cancellation token and only cancels it after
    /// its shutdown drain completes.
    pub async fn run(self, cancel: CancellationToken, out: mpsc::Sender<RemoteRunners>) {
        let mut epoch: i64 = 1;
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("synchronizer stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let begin_time = Instant::now();
            let runners = match self.enumerate().await {
                Ok(runners) => runners,
                Err(e) => {
                    warn!(error = %e, "failed to enumerate runners, skipping snapshot");
                    continue;
                }
            };

            info!(epoch, count = runners.len(), "runners synchronized");
            let snapshot = RemoteRunners {
                epoch,
                begin_time,
                runners,
            };

            tokio::select! {
                result = out.send(snapshot) => {
                    if result.is_err() {
                        // Monitor is gone; nothing left to publish to.
                        return;
                    }
                }
                _ = cancel.cancelled() => {
                    info!("synchronizer stopped");
                    return;
                }
            }

            epoch += 1;
        }
    }

    /// Fetch every page of the runner list, merging by name.
    ///
    /// A later page overwrites an earlier entry with the same name; the
    /// forge's ordering is authoritative.
    async fn enumerate(&self) -> Result<HashMap<String, RemoteRunner>, ForgeError> {
        let mut runners = HashMap::new();
        let mut page: u32 = 1;

        loop {
            debug!(page, "fetching runner page");
            let (entries, next_page) = self.target.list_runners(page, SYNC_PAGE_SIZE).await?;

            for entry in entries {
                runners.insert(
                    entry.name.clone(),
                    RemoteRunner {
                        id: entry.id,
                        name: entry.name,
                        is_online: entry.status == "online",
                    },
                );
            }

            if next_page == 0 {
                return Ok(runners);
            }
            page = next_page;
        }
    }
}

#[cfg(test)]
#[path = "synchronizer_tests.rs"]
mod tests;
