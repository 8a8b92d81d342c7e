// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! corrald — ephemeral CI runner VM coordinator.
//!
//! Architecture:
//! - One synchronizer task mirroring the forge's registration list
//! - One monitor task owning every local runner's state machine
//! - One callback server for agents to bootstrap and long-poll
//! - One supervisor task per configured slot, each owning one VM
//!
//! All tasks hang off a single root cancellation token triggered by
//! SIGINT/SIGTERM; the first task failure also cancels it and the
//! process exits non-zero.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use corral_coordinator::{
    mdns, CallbackServer, Config, InstanceMap, Monitor, RunnerSupervisor, Synchronizer, Vmctl,
};
use corral_forge::{RemoteTarget, TokenCache};
use parking_lot::RwLock;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "corrald", version, about = "Ephemeral CI runner VM coordinator")]
struct Opts {
    /// Path to the JSON config file
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    setup_logging();
    run(opts).await
}

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(opts: Opts) -> anyhow::Result<()> {
    let config = Config::load(&opts.config).context("cannot load config")?;
    let client = config
        .auth
        .create_client()
        .context("cannot create forge client")?;
    let target: Arc<dyn RemoteTarget> = Arc::from(
        corral_forge::target::from_url(&config.target, client).context("cannot load target")?,
    );

    let tokens = TokenCache::new(Arc::clone(&target));
    let instances: InstanceMap = Arc::new(RwLock::new(HashMap::new()));

    let (listener, port) = CallbackServer::bind()
        .await
        .context("cannot bind callback server")?;
    let callback_url = format!("http://{}:{}", local_hostname(), port);
    info!(%callback_url, "callback base URL");

    let cancel = CancellationToken::new();
    // The synchronizer outlives root cancellation: the monitor stops it
    // once its shutdown drain no longer needs fresh snapshots.
    let sync_cancel = CancellationToken::new();

    let (snapshot_tx, snapshot_rx) = mpsc::channel(1);
    let (monitor_tx, monitor_rx) = mpsc::channel(64);

    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    let synchronizer = Synchronizer::new(Arc::clone(&target));
    {
        let sync_cancel = sync_cancel.clone();
        tasks.spawn(async move {
            synchronizer.run(sync_cancel, snapshot_tx).await;
            Ok(())
        });
    }

    let monitor = Monitor::new(Arc::clone(&target));
    {
        let cancel = cancel.clone();
        let sync_cancel = sync_cancel.clone();
        tasks.spawn(async move {
            monitor.run(cancel, sync_cancel, snapshot_rx, monitor_rx).await;
            Ok(())
        });
    }

    let server = CallbackServer::new(Arc::clone(&instances), tokens, target.url());
    {
        let cancel = cancel.clone();
        tasks.spawn(async move { server.run(listener, cancel).await.map_err(Into::into) });
    }

    {
        let cancel = cancel.clone();
        tasks.spawn(async move {
            mdns::advertise(port, cancel).await;
            Ok(())
        });
    }

    let vmctl = Vmctl::new(&config.vmctl_path);
    for (index, slot) in config.runners.iter().enumerate() {
        let supervisor = RunnerSupervisor::new(
            index,
            vmctl.clone(),
            slot.clone(),
            Arc::clone(&instances),
            monitor_tx.clone(),
            callback_url.clone(),
        );
        let cancel = cancel.clone();
        tasks.spawn(async move { supervisor.run(cancel).await.map_err(Into::into) });
    }
    // The monitor's message channel closes once the last supervisor exits.
    drop(monitor_tx);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(slots = config.runners.len(), "coordinator started");

    let mut failed = false;
    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, exiting...");
                cancel.cancel();
            }
            _ = sigint.recv() => {
                info!("received SIGINT, exiting...");
                cancel.cancel();
            }
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    error!(error = %e, "task failed, shutting down");
                    failed = true;
                    cancel.cancel();
                }
                Some(Err(e)) => {
                    error!(error = %e, "task panicked, shutting down");
                    failed = true;
                    cancel.cancel();
                }
            }
        }
    }

    if failed {
        anyhow::bail!("coordinator failed");
    }

    info!("coordinator stopped");
    Ok(())
}

fn local_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
