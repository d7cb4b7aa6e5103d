// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! pitrix-job - Cluster Job Controller
//!
//! Runs the job controller against a PostgreSQL or SQLite database:
//! - dequeues cluster jobs and claims them for this host
//! - splits each job into task layers through its provider plugin
//! - dispatches tasks and waits for them layer by layer
//! - reconciles cluster and node status when a job finishes

use std::sync::Arc;

use tracing::{info, warn};

use pitrix_job::config::Config;
use pitrix_job::persistence::{Persistence, PostgresPersistence, SqlitePersistence};
use pitrix_job::runtime::JobRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pitrix_job=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        job_length = config.job_length,
        hostname = %config.hostname,
        vm_providers = ?config.vm_providers,
        "Starting pitrix-job"
    );

    let persistence: Arc<dyn Persistence> = if config.database_url.starts_with("sqlite:") {
        Arc::new(SqlitePersistence::connect(&config.database_url).await?)
    } else {
        let max_connections = (config.job_length as u32).saturating_add(2);
        Arc::new(PostgresPersistence::connect(&config.database_url, max_connections).await?)
    };

    info!("Connected to database");

    let runtime = JobRuntime::builder()
        .config(&config)
        .persistence(persistence)
        .build()?
        .start()
        .await?;

    info!("Job controller ready");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    runtime.shutdown().await?;

    Ok(())
}
