// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator configuration file.

use std::path::{Path, PathBuf};

use corral_forge::AuthConfig;
use serde::Deserialize;
use thiserror::Error;

/// Configuration errors are startup-fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config has no runner slots")]
    NoRunners,

    #[error("config has no vmctlPath")]
    NoVmctl,
}

/// One runner slot: how to boot one kind of VM.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotConfig {
    /// Base VM image bundle this slot clones from.
    #[serde(rename = "baseVMBundlePath")]
    pub base_vm_bundle_path: PathBuf,
    /// VM hardware config handed to `vmctl start`.
    pub vm_config_path: PathBuf,

    #[serde(default)]
    pub runner_group: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Top-level coordinator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub auth: AuthConfig,
    /// Forge URL the runners register against (repository or organization).
    pub target: String,
    pub runners: Vec<SlotConfig>,
    pub vmctl_path: PathBuf,
}

impl Config {
    /// Load and validate the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = serde_json::from_slice(&data)?;

        if config.runners.is_empty() {
            return Err(ConfigError::NoRunners);
        }
        if config.vmctl_path.as_os_str().is_empty() {
            return Err(ConfigError::NoVmctl);
        }

        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
