// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mDNS advertisement of the callback service.
//!
//! Agents discover the callback endpoint through a `dns-sd`
//! registration. Best-effort: a failure to advertise is logged and the
//! coordinator carries on.

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Service type agents browse for.
pub const SERVICE_TYPE: &str = "_github-action._tcp";

/// Advertised service name.
pub const SERVICE_NAME: &str = "coordinator";

/// Publish the callback port until cancelled.
pub async fn advertise(port: u16, cancel: CancellationToken) {
    let mut child = match Command::new("dns-sd")
        .args(["-R", SERVICE_NAME, SERVICE_TYPE, ".", &port.to_string()])
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "cannot start mdns publisher");
            return;
        }
    };

    info!(port, service = SERVICE_TYPE, "advertising callback service");

    tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
        }
        status = child.wait() => {
            warn!(?status, "mdns publisher exited early");
        }
    }
}
