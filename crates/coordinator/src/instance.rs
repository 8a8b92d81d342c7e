// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-VM runner instance state.
//!
//! A [`RunnerInstance`] is created by its supervisor for each VM boot
//! and shared with the callback server (bearer lookup) and the monitor
//! (termination signalling). The supervisor keeps the receiving half of
//! the inbox and is the only consumer of identity messages.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::SlotConfig;
use crate::vm;

/// Process-wide monotonic instance counter.
static NEXT_INSTANCE_ID: AtomicU32 = AtomicU32::new(1);

/// Identity reported by the agent through the callback server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceMsg {
    /// The agent introduced itself at register time.
    Register { name: String, host_name: String },
    /// The agent reported its forge-assigned runner ID. `None` means
    /// the agent sent an empty update (no change).
    Update { runner_id: Option<i64> },
}

/// One live VM and the credentials its agent phones home with.
pub struct RunnerInstance {
    pub instance_id: u32,
    /// Bearer credential for all callbacks from this VM's agent.
    pub token: String,
    pub bundle_path: PathBuf,
    pub config_path: PathBuf,
    pub mac_address: String,
    pub slot: SlotConfig,

    inbox_tx: mpsc::Sender<InstanceMsg>,
    terminate: CancellationToken,
    kill: CancellationToken,
}

impl RunnerInstance {
    /// Create an instance for one VM boot inside `work_dir`.
    ///
    /// Returns the shared instance and the inbox receiver, which only
    /// the owning supervisor may hold.
    pub fn new(slot: SlotConfig, work_dir: &Path) -> (Arc<Self>, mpsc::Receiver<InstanceMsg>) {
        let instance_id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
        // Rendezvous: the server blocks until the supervisor pumps the
        // message, preserving per-instance ordering.
        let (inbox_tx, inbox_rx) = mpsc::channel(1);

        let instance = Arc::new(Self {
            instance_id,
            token: generate_token(instance_id),
            bundle_path: work_dir.join("vm.bundle"),
            config_path: work_dir.join("vm.json"),
            mac_address: vm::generate_mac_address(),
            slot,
            inbox_tx,
            terminate: CancellationToken::new(),
            kill: CancellationToken::new(),
        });

        (instance, inbox_rx)
    }

    /// Post an identity message to the supervisor's inbox.
    ///
    /// Returns `false` when the supervisor is already gone.
    pub async fn post(&self, msg: InstanceMsg) -> bool {
        self.inbox_tx.send(msg).await.is_ok()
    }

    /// Request termination.
    ///
    /// The progression is monotonic: a graceful request trips only the
    /// terminate signal; a kill request trips both. Repeat requests are
    /// no-ops.
    pub fn signal_terminate(&self, kill: bool) {
        self.terminate.cancel();
        if kill {
            self.kill.cancel();
        }
    }

    /// Resolves when graceful termination has been requested.
    pub async fn terminated(&self) {
        self.terminate.cancelled().await;
    }

    /// Resolves when forced termination has been requested.
    pub async fn killed(&self) {
        self.kill.cancelled().await;
    }

    pub fn is_terminating(&self) -> bool {
        self.terminate.is_cancelled()
    }
}

/// Bearer token: 96 random bits, base64url, with the instance ID
/// appended for log legibility.
fn generate_token(instance_id: u32) -> String {
    let bytes: [u8; 12] = rand::random();
    format!("{}-{}", URL_SAFE_NO_PAD.encode(bytes), instance_id)
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
