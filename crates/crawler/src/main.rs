// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fieldwork-crawler: the Fieldwork worker process.

use anyhow::{Context, Result};
use clap::Parser;
use fw_crawler::{
    Anonymizer, ArtifactStore, CrawlerConfig, LookupTable, ReqwestFetch, SocketClient,
    TaskProcessor,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fieldwork-crawler", about = "Fieldwork crawl worker")]
struct Args {
    /// Control-plane socket to connect to
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Directory for fetched artifacts
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Config file (default: crawler.toml next to the data dir)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(|| PathBuf::from("crawler.toml"));
    let mut config = CrawlerConfig::load(&config_path)?;
    config.apply_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FW_LOG")
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if config.anonymization_secret.is_empty() {
        tracing::warn!("anonymization secret is empty; pseudonyms are not portable across deployments");
    }
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    let lookup = LookupTable::new(config.lookup_db_path.clone(), config.lookup_db_disable_io);
    let anonymizer = Arc::new(Anonymizer::new(config.anonymization_secret.as_bytes(), lookup));
    let artifacts = ArtifactStore::new(config.data_dir.clone());

    let (client, jobs) = SocketClient::new(config.clone());
    let client = Arc::new(client);
    let processor = Arc::new(TaskProcessor::new(
        config.clone(),
        Arc::new(ReqwestFetch::new()),
        artifacts,
        anonymizer,
        client.handle(),
    ));

    tracing::info!(
        socket = %config.socket_path.display(),
        data_dir = %config.data_dir.display(),
        "fieldwork-crawler starting"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                cancel.cancel();
            }
        });
    }

    let client_task = {
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        tokio::spawn(async move { client.run(cancel).await })
    };
    let processor_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { processor.run(jobs, cancel).await })
    };

    let _ = tokio::join!(client_task, processor_task);
    tracing::info!("fieldwork-crawler stopped");
    Ok(())
}
