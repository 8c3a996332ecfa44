//! # Tenant Controller
//!
//! Creates and decommissions tenants in the shared inventory by reconciling
//! the external project lifecycle.
//!
//! ## Overview
//!
//! - **Initialization**: provisions baseline resources and the tenant record
//!   when a project appears.
//! - **Termination**: tears the tenant down in a fixed, dependency-safe order
//!   when the project is deleted.
//! - **Reconciliation**: two keyed loops with independent backoff bridge the
//!   project signals into both.
//!
//! The process runs against in-memory collaborators. Projects can be seeded
//! from the command line to exercise the full lifecycle.

use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use tenancy_server::infra::{
    config::{ConfigLoader, ConfigLoaderOptions},
    control_plane::{ControlPlane, seed_projects},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "tenant-controller")]
#[command(about = "Tenant lifecycle controller for the shared edge inventory")]
struct Cli {
    /// Path to the configuration file (defaults to tenancy.toml or config/tenancy.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before reading the environment
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Seed a project with this name at startup (repeatable)
    #[arg(long = "project", value_name = "NAME")]
    projects: Vec<String>,

    /// Request deletion of the seeded projects after this many milliseconds
    #[arg(long, value_name = "MS")]
    delete_after_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let load = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.config.clone(),
        env_file: cli.env_file.clone(),
    })
    .load()
    .context("failed to load configuration")?;
    let config = load.config;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tenancy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    match config.metadata.config_path.as_ref() {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => info!("configuration loaded from defaults and environment"),
    }
    for warning in &load.warnings.items {
        match &warning.hint {
            Some(hint) => warn!(message = %warning.message, hint = %hint, "configuration warning"),
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }
    info!(
        owner = %config.owner,
        parallelism = config.controller.reconciler.parallelism,
        hard_delete_fallback = config.controller.termination.hard_delete_fallback,
        wait_tick_ms = config.controller.termination.wait_tick_ms,
        definition_sources = config.definitions.paths.len(),
        "starting tenant controller"
    );

    let control_plane = ControlPlane::standalone(&config);
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown signal received"),
                Err(err) => error!(error = %err, "failed to listen for shutdown signal"),
            }
            shutdown.cancel();
        }
    });

    if !cli.projects.is_empty() {
        let datamodel = control_plane.datamodel();
        let delete_after = cli.delete_after_ms.map(Duration::from_millis);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = seed_projects(datamodel, cli.projects, delete_after, shutdown).await {
                error!(error = %err, "project seeding failed");
            }
        });
    } else if cli.delete_after_ms.is_some() {
        warn!("--delete-after-ms has no effect without --project");
    }

    control_plane.run(shutdown).await?;
    info!("tenant controller stopped");
    Ok(())
}
