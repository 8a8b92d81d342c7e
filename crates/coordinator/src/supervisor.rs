// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-slot runner supervision.
//!
//! Each configured slot gets one supervisor that keeps it populated
//! with a live VM: clone the base bundle, boot the VM, hand the agent
//! its callback credentials, pump identity messages into the monitor,
//! and restart with a fresh instance after every exit. Clone and start
//! failures are slot-fatal; a misconfigured slot takes the process
//! down. Runtime VM failures just trigger the next boot.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SlotConfig;
use crate::instance::{InstanceMsg, RunnerInstance};
use crate::monitor::MonitorMsg;
use crate::server::InstanceMap;
use crate::vm::{self, VmError, Vmctl};

/// Slot-fatal supervisor failures.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to create working directory: {0}")]
    Workdir(std::io::Error),

    #[error("failed to init VM: {0}")]
    Init(#[from] VmError),

    #[error("failed to write bootstrap message: {0}")]
    Bootstrap(std::io::Error),
}

/// The supervisor's merged view of the agent-reported identity.
///
/// Name and ID are each set at most once; later differing reports are
/// ignored.
#[derive(Debug, Default)]
struct Identity {
    name: String,
    runner_id: i64,
}

impl Identity {
    fn merge(&mut self, msg: &InstanceMsg) {
        match msg {
            InstanceMsg::Register { name, .. } => {
                if self.name.is_empty() && !name.is_empty() {
                    self.name = name.clone();
                }
            }
            InstanceMsg::Update { runner_id } => {
                if let Some(id) = runner_id {
                    if self.runner_id == 0 && *id != 0 {
                        self.runner_id = *id;
                    }
                }
            }
        }
    }
}

/// Keeps one slot continuously populated with a live VM.
pub struct RunnerSupervisor {
    slot_index: usize,
    vmctl: Vmctl,
    slot: SlotConfig,
    instances: InstanceMap,
    monitor_tx: mpsc::Sender<MonitorMsg>,
    /// Base URL the agent phones home to, e.g. `http://host:1234`.
    callback_url: String,
}

impl RunnerSupervisor {
    pub fn new(
        slot_index: usize,
        vmctl: Vmctl,
        slot: SlotConfig,
        instances: InstanceMap,
        monitor_tx: mpsc::Sender<MonitorMsg>,
        callback_url: String,
    ) -> Self {
        Self {
            slot_index,
            vmctl,
            slot,
            instances,
            monitor_tx,
            callback_url,
        }
    }

    /// Boot VMs back to back until cancellation.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SupervisorError> {
        while !cancel.is_cancelled() {
            self.run_vm(&cancel).await?;
            if !cancel.is_cancelled() {
                info!(slot = self.slot_index, "VM exited, restarting VM");
            }
        }
        Ok(())
    }

    /// One full VM lifetime: init, boot, pump, tear down.
    async fn run_vm(&self, cancel: &CancellationToken) -> Result<(), SupervisorError> {
        let work_dir = tempfile::Builder::new()
            .prefix(&format!("runner-{}-", self.slot_index))
            .tempdir()
            .map_err(SupervisorError::Workdir)?;
        info!(
            slot = self.slot_index,
            dir = %work_dir.path().display(),
            "created working directory"
        );

        let (instance, mut inbox) = RunnerInstance::new(self.slot.clone(), work_dir.path());
        info!(
            instance_id = instance.instance_id,
            mac = %instance.mac_address,
            "created runner instance"
        );

        self.vmctl
            .clone_bundle(&self.slot.base_vm_bundle_path, &instance.bundle_path)
            .await?;
        vm::prepare_config(
            &self.slot.vm_config_path,
            &instance.config_path,
            &instance.mac_address,
        )?;

        self.instances
            .write()
            .insert(instance.token.clone(), Arc::clone(&instance));
        let _ = self
            .monitor_tx
            .send(MonitorMsg::Register {
                instance_id: instance.instance_id,
                instance: Arc::clone(&instance),
            })
            .await;

        let mut identity = Identity::default();
        let result = self
            .drive_vm(cancel, &instance, &mut inbox, &mut identity)
            .await;

        self.instances.write().remove(&instance.token);

        // Updates posted while the exit was being observed still land
        // before the exit notice.
        while let Ok(msg) = inbox.try_recv() {
            identity.merge(&msg);
            self.forward_identity(&instance, &identity).await;
        }
        let _ = self
            .monitor_tx
            .send(MonitorMsg::Exited {
                instance_id: instance.instance_id,
            })
            .await;

        info!(
            slot = self.slot_index,
            dir = %work_dir.path().display(),
            "deleting working directory"
        );
        result
    }

    /// Boot the VM and pump its lifetime events.
    ///
    /// Cancellation wins over the exit race: once graceful termination
    /// or outer cancellation has been observed, a child error is logged
    /// rather than surfaced.
    async fn drive_vm(
        &self,
        cancel: &CancellationToken,
        instance: &Arc<RunnerInstance>,
        inbox: &mut mpsc::Receiver<InstanceMsg>,
        identity: &mut Identity,
    ) -> Result<(), SupervisorError> {
        let mut child = self
            .vmctl
            .start(&instance.config_path, &instance.bundle_path)?;
        let pid = child.id();

        // Bootstrap: the agent reads one line to learn where to phone
        // home and what token to present. Keep stdin open afterwards;
        // the VM owns the other end for its lifetime.
        let mut stdin = child.stdin.take();
        if let Some(stdin) = stdin.as_mut() {
            let line = format!("{} {}\n", self.callback_url, instance.token);
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(SupervisorError::Bootstrap)?;
        }

        spawn_log_scanner(instance.instance_id, "stdout", child.stdout.take());
        spawn_log_scanner(instance.instance_id, "stderr", child.stderr.take());

        // Phase 1: run until exit, graceful termination, or cancellation.
        loop {
            tokio::select! {
                status = child.wait() => {
                    log_exit(instance.instance_id, &status);
                    return Ok(());
                }
                Some(msg) = inbox.recv() => {
                    identity.merge(&msg);
                    self.forward_identity(instance, identity).await;
                }
                _ = instance.terminated() => break,
                _ = cancel.cancelled() => {
                    instance.signal_terminate(false);
                    break;
                }
            }
        }

        // Phase 2: graceful window. The agent is expected to exit on
        // its own (it sees `/wait` return 204); escalate to a group
        // kill when told to.
        info!(instance_id = instance.instance_id, "terminating VM");
        loop {
            tokio::select! {
                status = child.wait() => {
                    log_exit(instance.instance_id, &status);
                    return Ok(());
                }
                Some(msg) = inbox.recv() => {
                    identity.merge(&msg);
                    self.forward_identity(instance, identity).await;
                }
                _ = instance.killed() => {
                    warn!(instance_id = instance.instance_id, "force killing VM");
                    if let Some(pid) = pid {
                        vm::kill_group(pid);
                    }
                    let _ = child.wait().await;
                    return Ok(());
                }
            }
        }
    }

    async fn forward_identity(&self, instance: &Arc<RunnerInstance>, identity: &Identity) {
        let _ = self
            .monitor_tx
            .send(MonitorMsg::Update {
                instance_id: instance.instance_id,
                runner_name: identity.name.clone(),
                runner_id: identity.runner_id,
            })
            .await;
    }
}

fn log_exit(instance_id: u32, status: &std::io::Result<std::process::ExitStatus>) {
    match status {
        Ok(status) if status.success() => {
            info!(instance_id, "VM exited");
        }
        Ok(status) => {
            warn!(instance_id, %status, "VM exited with failure");
        }
        Err(e) => {
            warn!(instance_id, error = %e, "cannot wait for VM");
        }
    }
}

/// Re-emit one of the VM's output streams as log lines.
fn spawn_log_scanner<R>(instance_id: u32, stream: &'static str, source: Option<R>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let Some(source) = source else {
        return;
    };

    tokio::spawn(async move {
        let mut lines = BufReader::new(source).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    info!(target: "corral::vm_log", instance_id, stream, "{}", line);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(instance_id, stream, error = %e, "cannot scan VM output");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
