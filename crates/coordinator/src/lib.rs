// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner coordinator core.
//!
//! Keeps a fleet of ephemeral CI runner VMs alive: each configured slot
//! boots one VM at a time, the VM's agent phones home through the
//! callback server, the synchronizer mirrors the forge's registration
//! list into epoch-tagged snapshots, and the monitor drives every local
//! VM through its lifecycle against those snapshots.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod env;
pub mod instance;
pub mod mdns;
pub mod monitor;
pub mod server;
pub mod supervisor;
pub mod synchronizer;
pub mod vm;

pub use config::{Config, ConfigError, SlotConfig};
pub use instance::{InstanceMsg, RunnerInstance};
pub use monitor::{Monitor, MonitorMsg};
pub use server::{CallbackServer, InstanceMap};
pub use supervisor::{RunnerSupervisor, SupervisorError};
pub use synchronizer::{RemoteRunner, RemoteRunners, Synchronizer};
pub use vm::{Vmctl, VmError};
