// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fieldworkd: the Fieldwork control-plane daemon.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fs2::FileExt;
use fw_control::{env, ControlConfig, Server};
use fw_core::SystemClock;
use fw_storage::Store;
use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fieldworkd", about = "Fieldwork control-plane daemon")]
struct Args {
    /// Socket path (default: <state-dir>/fieldworkd.sock)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// State directory (default: FW_STATE_DIR or ~/.local/state/fieldwork)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Config file (default: <state-dir>/control.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let state_dir = args
        .state_dir
        .or_else(env::state_dir)
        .context("cannot resolve a state directory; set FW_STATE_DIR")?;
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating state dir {}", state_dir.display()))?;

    let logs_dir = state_dir.join("logs");
    std::fs::create_dir_all(&logs_dir)?;
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "fieldworkd.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FW_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(file_writer)
        .with_ansi(false)
        .init();

    // One daemon per state dir.
    let lock_path = state_dir.join("fieldworkd.lock");
    let lock_file = File::create(&lock_path)
        .with_context(|| format!("creating lock file {}", lock_path.display()))?;
    if lock_file.try_lock_exclusive().is_err() {
        bail!("another fieldworkd is already running for {}", state_dir.display());
    }

    let config_path = args.config.unwrap_or_else(|| state_dir.join("control.toml"));
    let mut config = ControlConfig::load(&config_path)?;
    env::apply_overrides(&mut config);

    let store = Arc::new(Store::open(&state_dir)?);
    let recovered = store.recover_running_jobs(fw_core::Clock::epoch_ms(&SystemClock))?;
    if recovered > 0 {
        tracing::info!(recovered, "requeued jobs left running by a previous run");
    }

    let socket_path = args
        .socket
        .or_else(env::socket_path)
        .unwrap_or_else(|| state_dir.join("fieldworkd.sock"));
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .with_context(|| format!("removing stale socket {}", socket_path.display()))?;
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding {}", socket_path.display()))?;
    tracing::info!(socket = %socket_path.display(), "fieldworkd listening");

    // OAuth refreshers are injected by the embedding deployment; the
    // daemon runs without any and answers refresh requests negatively.
    let server = Server::new(store, config, SystemClock, HashMap::new());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(sig) => sig,
                Err(err) => {
                    tracing::error!(error = %err, "cannot install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            tracing::info!("shutdown signal received");
            cancel.cancel();
        });
    }

    server.run(listener, cancel).await;

    let _ = std::fs::remove_file(&socket_path);
    let _ = fs2::FileExt::unlock(&lock_file);
    tracing::info!("fieldworkd stopped");
    Ok(())
}
