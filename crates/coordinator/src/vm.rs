// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vmctl` subprocess control and VM config preparation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::process::{Child, Command};

/// Errors from VM control operations.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("vmctl {verb} failed: {message}")]
    CommandFailed { verb: &'static str, message: String },

    #[error("cannot read VM config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse VM config {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("VM config {path} is not a JSON object")]
    NotAnObject { path: PathBuf },

    #[error("cannot write VM config {path}: {source}")]
    WriteConfig {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Handle on the configured `vmctl` binary.
#[derive(Debug, Clone)]
pub struct Vmctl {
    path: PathBuf,
}

impl Vmctl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Clone the base bundle into `dest`.
    pub async fn clone_bundle(&self, base: &Path, dest: &Path) -> Result<(), VmError> {
        tracing::debug!(base = %base.display(), dest = %dest.display(), "cloning vm");

        let output = Command::new(&self.path)
            .arg("clone")
            .arg(base)
            .arg(dest)
            .output()
            .await
            .map_err(|e| VmError::CommandFailed {
                verb: "clone",
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VmError::CommandFailed {
                verb: "clone",
                message: stderr.trim().to_string(),
            });
        }

        Ok(())
    }

    /// Start the VM as a child in its own process group.
    ///
    /// stdin carries the one-line bootstrap message; stdout and stderr
    /// are piped for the per-instance log scanners.
    pub fn start(&self, config: &Path, bundle: &Path) -> Result<Child, VmError> {
        tracing::debug!(config = %config.display(), bundle = %bundle.display(), "starting vm");

        Command::new(&self.path)
            .arg("start")
            .arg("--config")
            .arg(config)
            .arg("--bundle")
            .arg(bundle)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VmError::CommandFailed {
                verb: "start",
                message: e.to_string(),
            })
    }
}

/// Write the per-instance VM config: the base hardware config with the
/// generated MAC address injected.
pub fn prepare_config(base: &Path, dest: &Path, mac_address: &str) -> Result<(), VmError> {
    let data = std::fs::read(base).map_err(|source| VmError::ReadConfig {
        path: base.to_path_buf(),
        source,
    })?;

    let mut config: serde_json::Value =
        serde_json::from_slice(&data).map_err(|source| VmError::ParseConfig {
            path: base.to_path_buf(),
            source,
        })?;

    let object = config.as_object_mut().ok_or_else(|| VmError::NotAnObject {
        path: base.to_path_buf(),
    })?;
    object.insert(
        "macAddress".to_string(),
        serde_json::Value::String(mac_address.to_string()),
    );

    let data = serde_json::to_vec(&config).map_err(|source| VmError::ParseConfig {
        path: dest.to_path_buf(),
        source,
    })?;
    std::fs::write(dest, data).map_err(|source| VmError::WriteConfig {
        path: dest.to_path_buf(),
        source,
    })?;

    Ok(())
}

/// Random locally-administered unicast MAC address.
pub fn generate_mac_address() -> String {
    let mut bytes: [u8; 6] = rand::random();
    // unicast
    bytes[0] &= !(1 << 0);
    // locally administered
    bytes[0] |= 1 << 1;
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    )
}

/// SIGKILL the VM's whole process group so no descendants survive.
pub fn kill_group(pid: u32) {
    let pgid = Pid::from_raw(pid as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        tracing::warn!(pid, error = %e, "cannot kill vm process group");
    }
}

#[cfg(test)]
#[path = "vm_tests.rs"]
mod tests;
