#![forbid(unsafe_code)]
//! Visage command-line front end.
//!
//! Subcommands:
//! - `enroll`: register one user from a recorded capture session
//! - `verify`: identify every face in a recorded capture session
//! - `list`: print the enrolled identities

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use visage_core::load_registry;

mod config;
mod enroll;
mod env_utils;
mod replay;
mod verify;

use crate::config::AppConfig;
use crate::enroll::run_enroll;
use crate::replay::open_replay;
use crate::verify::run_verify;

#[derive(Debug, Parser)]
#[command(name = "visage", version, about = "Face enrollment and verification")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture one face and add it to the registry.
    Enroll {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        name: String,
        /// Directory of recorded frames.
        #[arg(long)]
        frames: PathBuf,
    },
    /// Identify faces frame by frame.
    Verify {
        #[arg(long)]
        frames: PathBuf,
        /// Stop after this many polls; defaults to the number of recorded frames.
        #[arg(long)]
        max_polls: Option<u64>,
    },
    /// Print enrolled identities.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        registry = %config.registry_path.display(),
        dimension = config.dimension,
        match_tolerance = config.match_tolerance,
        "visage started"
    );

    match cli.command {
        Command::Enroll {
            user_id,
            name,
            frames,
        } => {
            let (device, mut analyzer) = open_replay(&frames)?;
            run_enroll(&config, device, &mut analyzer, &user_id, &name)?;
        }
        Command::Verify { frames, max_polls } => {
            let registry = load_registry(&config.registry_path, config.dimension)
                .with_context(|| {
                    format!(
                        "failed to load registry {}",
                        config.registry_path.display()
                    )
                })?;
            if registry.is_empty() {
                tracing::warn!("no registered faces found");
            }

            let (device, mut analyzer) = open_replay(&frames)?;
            let max_polls = max_polls.unwrap_or(device.remaining() as u64);
            run_verify(
                &config,
                &registry,
                device,
                &mut analyzer,
                max_polls,
                shutdown_signal(),
            )
            .await?;
        }
        Command::List => {
            let registry = load_registry(&config.registry_path, config.dimension)
                .with_context(|| {
                    format!(
                        "failed to load registry {}",
                        config.registry_path.display()
                    )
                })?;
            for record in registry.iter() {
                println!("{}\t{}", record.user_id, record.display_name);
            }
            tracing::info!(records = registry.len(), "registry listed");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to initialize tracing subscriber: {error}");
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(error) => {
            tracing::error!(%error, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}
