// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local runner lifecycle tracking.
//!
//! The monitor is the single owner of all local runner records. Every
//! input arrives on a channel: identity updates relayed by the callback
//! server, exit notices from supervisors, and snapshots from the
//! synchronizer. Each VM walks pending → configuring → starting →
//! ready → terminating, with readiness and disappearance decided
//! against the latest snapshot only.

use std::collections::HashMap;
use std::sync::Arc;

use corral_forge::RemoteTarget;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::instance::RunnerInstance;
use crate::synchronizer::RemoteRunners;

/// A runner stuck in a pre-ready state for more than this many epochs
/// is forcibly terminated. An epoch delta, not wall time: operators
/// tune responsiveness through the sync interval.
pub const TRANSITION_TIMEOUT_EPOCHS: i64 = 10;

/// Lifecycle states of one local VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Registered with the monitor, agent not yet heard from.
    Pending,
    /// Agent reported its name.
    Configuring,
    /// Agent reported its forge-assigned ID.
    Starting,
    /// The forge sees the runner online.
    Ready,
    /// Being torn down; removed once dead, unregistered and confirmed
    /// by a fresh snapshot.
    Terminating,
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Configuring => "configuring",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Terminating => "terminating",
        })
    }
}

/// Messages into the monitor task.
pub enum MonitorMsg {
    /// A supervisor created a new instance.
    Register {
        instance_id: u32,
        instance: Arc<RunnerInstance>,
    },
    /// The agent reported identity; values are the supervisor's merged
    /// copy (name set once, ID set once).
    Update {
        instance_id: u32,
        runner_name: String,
        runner_id: i64,
    },
    /// The VM process exited, for whatever reason.
    Exited { instance_id: u32 },
}

struct LocalRunner {
    instance_id: u32,
    instance: Arc<RunnerInstance>,
    is_dead: bool,

    /// Epoch at the last state change.
    epoch: i64,
    last_transition: Instant,
    state: RunnerState,

    runner_name: String,
    runner_id: i64,
}

impl LocalRunner {
    /// Transition, stamping epoch and wall time only on actual change.
    fn update(&mut self, epoch: i64, state: RunnerState) {
        if self.state == state {
            return;
        }
        self.epoch = epoch;
        self.last_transition = Instant::now();
        self.state = state;
    }
}

/// Single-task owner of the local runner table.
pub struct Monitor {
    target: Arc<dyn RemoteTarget>,
    local: HashMap<u32, LocalRunner>,
    remote: RemoteRunners,
}

impl Monitor {
    pub fn new(target: Arc<dyn RemoteTarget>) -> Self {
        Self {
            target,
            local: HashMap::new(),
            remote: RemoteRunners::empty(),
        }
    }

    /// Process messages and snapshots until cancelled, then drain.
    ///
    /// On cancellation every local runner is forced into terminating
    /// and the loop keeps consuming snapshots until the table empties,
    /// so deletion decisions during shutdown still see live remote
    /// data. Only then is the synchronizer stopped.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        sync_cancel: CancellationToken,
        mut snapshots: mpsc::Receiver<RemoteRunners>,
        mut messages: mpsc::Receiver<MonitorMsg>,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(snapshot) = snapshots.recv() => self.apply_snapshot(snapshot).await,
                Some(msg) = messages.recv() => self.handle_message(msg).await,
                else => break,
            }
        }

        self.cleanup_runners().await;

        while !self.local.is_empty() {
            tokio::select! {
                Some(snapshot) = snapshots.recv() => self.apply_snapshot(snapshot).await,
                Some(msg) = messages.recv() => self.handle_message(msg).await,
                else => break,
            }
        }

        sync_cancel.cancel();
    }

    async fn apply_snapshot(&mut self, snapshot: RemoteRunners) {
        self.remote = snapshot;
        self.check_runners().await;
    }

    async fn handle_message(&mut self, msg: MonitorMsg) {
        match msg {
            MonitorMsg::Register {
                instance_id,
                instance,
            } => {
                info!(instance_id, "registering runner");
                self.local.insert(
                    instance_id,
                    LocalRunner {
                        instance_id,
                        instance,
                        is_dead: false,
                        epoch: self.remote.epoch,
                        last_transition: Instant::now(),
                        state: RunnerState::Pending,
                        runner_name: String::new(),
                        runner_id: 0,
                    },
                );
            }

            MonitorMsg::Update {
                instance_id,
                runner_name,
                runner_id,
            } => {
                let epoch = self.remote.epoch;
                let Some(runner) = self.local.get_mut(&instance_id) else {
                    warn!(instance_id, "update for unknown runner");
                    return;
                };

                if runner.runner_name.is_empty() && !runner_name.is_empty() {
                    info!(instance_id, runner_name = %runner_name, "configuring runner");
                    runner.runner_name = runner_name;
                    runner.update(epoch, RunnerState::Configuring);
                }

                if runner.runner_id == 0 && runner_id != 0 {
                    info!(
                        instance_id,
                        runner_name = %runner.runner_name,
                        runner_id,
                        "starting runner"
                    );
                    runner.runner_id = runner_id;
                    runner.update(epoch, RunnerState::Starting);
                }
            }

            MonitorMsg::Exited { instance_id } => {
                let epoch = self.remote.epoch;
                let Some(runner) = self.local.get_mut(&instance_id) else {
                    warn!(instance_id, "exit for unknown runner");
                    return;
                };

                info!(
                    instance_id,
                    runner_name = %runner.runner_name,
                    runner_id = runner.runner_id,
                    "terminating runner"
                );
                runner.update(epoch, RunnerState::Terminating);
                runner.is_dead = true;
                self.terminate(instance_id).await;
            }
        }
    }

    /// Sweep every runner against the latest snapshot.
    async fn check_runners(&mut self) {
        debug!(count = self.local.len(), "checking runners");

        let ids: Vec<u32> = self.local.keys().copied().collect();
        for id in ids {
            let Some(state) = self.local.get(&id).map(|r| r.state) else {
                continue;
            };

            match state {
                RunnerState::Pending | RunnerState::Configuring => {
                    self.check_timeout(id).await;
                }

                RunnerState::Starting => {
                    if !self.check_timeout(id).await {
                        continue;
                    }

                    let epoch = self.remote.epoch;
                    let Some(runner) = self.local.get_mut(&id) else {
                        continue;
                    };
                    let online = self
                        .remote
                        .lookup(&runner.runner_name, runner.runner_id)
                        .is_some_and(|r| r.is_online);
                    if online {
                        info!(
                            instance_id = id,
                            runner_name = %runner.runner_name,
                            "runner is ready"
                        );
                        runner.update(epoch, RunnerState::Ready);
                    }
                }

                RunnerState::Ready => {
                    let epoch = self.remote.epoch;
                    let gone = {
                        let Some(runner) = self.local.get(&id) else {
                            continue;
                        };
                        !self
                            .remote
                            .lookup(&runner.runner_name, runner.runner_id)
                            .is_some_and(|r| r.is_online)
                    };
                    if gone {
                        if let Some(runner) = self.local.get_mut(&id) {
                            info!(
                                instance_id = id,
                                runner_name = %runner.runner_name,
                                "runner is gone"
                            );
                            runner.update(epoch, RunnerState::Terminating);
                        }
                        self.terminate(id).await;
                    }
                }

                RunnerState::Terminating => {
                    self.terminate(id).await;
                }
            }
        }
    }

    /// Terminate a runner that has not advanced within the epoch budget.
    ///
    /// Returns `false` when the runner timed out (and was torn down).
    async fn check_timeout(&mut self, id: u32) -> bool {
        let epoch = self.remote.epoch;
        {
            let Some(runner) = self.local.get_mut(&id) else {
                return false;
            };
            if (epoch - runner.epoch) <= TRANSITION_TIMEOUT_EPOCHS {
                return true;
            }

            warn!(
                instance_id = id,
                runner_name = %runner.runner_name,
                state = %runner.state,
                elapsed = ?self.remote.begin_time.duration_since(runner.last_transition),
                "runner timed out, terminating"
            );
            runner.update(epoch, RunnerState::Terminating);
            runner.instance.signal_terminate(true);
        }
        self.terminate(id).await;
        false
    }

    /// One termination pass over a terminating runner.
    ///
    /// The record is removed only once the VM is dead, any remote
    /// registration is gone (or its deletion was abandoned as overdue),
    /// and a snapshot strictly newer than the termination epoch has
    /// been observed — so a reused name can never match a stale entry.
    async fn terminate(&mut self, id: u32) {
        let (is_overdue, needs_fresh_snapshot, remote_id) = {
            let Some(runner) = self.local.get(&id) else {
                return;
            };
            let is_overdue = (self.remote.epoch - runner.epoch) > TRANSITION_TIMEOUT_EPOCHS;
            let remote_id = self
                .remote
                .lookup(&runner.runner_name, runner.runner_id)
                .map(|r| r.id);

            if !runner.is_dead {
                runner.instance.signal_terminate(is_overdue);
            }

            (is_overdue, self.remote.epoch <= runner.epoch, remote_id)
        };

        let mut done = self
            .local
            .get(&id)
            .map(|runner| runner.is_dead)
            .unwrap_or(false);

        if let Some(remote_id) = remote_id {
            let runner_name = self
                .local
                .get(&id)
                .map(|r| r.runner_name.clone())
                .unwrap_or_default();
            info!(
                runner_id = remote_id,
                runner_name = %runner_name,
                "unregistering runner"
            );

            if let Err(e) = self.target.delete_runner(remote_id).await {
                warn!(runner_id = remote_id, error = %e, "failed to delete runner");
                if is_overdue {
                    warn!(runner_id = remote_id, "retry count exceeded, abandoning");
                } else {
                    done = false;
                }
            }
        }

        if needs_fresh_snapshot {
            // One more sync is required so later readiness checks never
            // see a stale entry for this name.
            done = false;
        }

        if !done {
            return;
        }

        if let Some(runner) = self.local.remove(&id) {
            info!(
                instance_id = id,
                runner_name = %runner.runner_name,
                "removing runner"
            );
        }
    }

    /// Force every runner into terminating at shutdown.
    async fn cleanup_runners(&mut self) {
        info!(count = self.local.len(), "cleaning up runners");

        let epoch = self.remote.epoch;
        let ids: Vec<u32> = self.local.keys().copied().collect();
        for id in ids {
            if let Some(runner) = self.local.get_mut(&id) {
                runner.update(epoch, RunnerState::Terminating);
            }
            self.terminate(id).await;
        }
    }

    #[cfg(test)]
    fn state_of(&self, id: u32) -> Option<RunnerState> {
        self.local.get(&id).map(|r| r.state)
    }

    #[cfg(test)]
    fn contains(&self, id: u32) -> bool {
        self.local.contains_key(&id)
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
