//! Taskwatch - print repository task file changes as JSON lines.
//!
//! Each monitored repository's tracked file is watched until Ctrl-C. Sync
//! messages go to stdout, logs go to stderr.

mod json_lines;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use taskwatch_repo_sync::{AddOutcome, SyncConfig, SyncCoordinator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::json_lines::JsonLinesBroadcaster;

#[derive(Debug, Parser)]
#[command(name = "taskwatch", version, about)]
struct Args {
    /// TOML configuration file. Flags override its values.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debounce window in milliseconds.
    #[arg(long, value_name = "MS")]
    debounce_ms: Option<u64>,

    /// Maximum number of repositories monitored at once.
    #[arg(long, value_name = "N")]
    max_repositories: Option<usize>,

    /// Tracked file path relative to each repository.
    #[arg(long, value_name = "REL")]
    tracked_file: Option<PathBuf>,

    /// Repositories to monitor.
    #[arg(required = true, value_name = "REPO")]
    repositories: Vec<PathBuf>,
}

impl Args {
    fn sync_config(&self) -> anyhow::Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => SyncConfig::default(),
        };

        if let Some(debounce_ms) = self.debounce_ms {
            config = config.with_debounce_ms(debounce_ms);
        }
        if let Some(max_repositories) = self.max_repositories {
            config = config.with_max_repositories(max_repositories);
        }
        if let Some(tracked_file) = &self.tracked_file {
            config = config.with_tracked_file(tracked_file.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.sync_config()?;

    let coordinator = SyncCoordinator::new(config, Arc::new(JsonLinesBroadcaster::stdout()));
    coordinator.initialize().await?;

    for repository in &args.repositories {
        match coordinator.add_repository(repository).await {
            Ok(AddOutcome::Added { watching: true }) => {}
            Ok(AddOutcome::Added { watching: false }) => {
                warn!(
                    "{} has no tracked file yet; changes will not be reported",
                    repository.display()
                );
            }
            Ok(AddOutcome::AlreadyMonitored) => {
                info!("{} listed more than once", repository.display());
            }
            Ok(AddOutcome::Rejected { reason }) => {
                warn!("Skipping {}: {reason:?}", repository.display());
            }
            Err(e) => {
                warn!("Failed to add {}: {e}", repository.display());
            }
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down");

    coordinator.shutdown().await;
    Ok(())
}
