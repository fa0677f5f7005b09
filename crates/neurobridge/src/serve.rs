// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `neurobridge serve` command implementation.
//!
//! Opens the database, wires the services to the filesystem object store
//! and the configured workflow engine, starts the dispatch reconciler, and
//! serves the HTTP gateway until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use neurobridge_config::model::NeuroBridgeConfig;
use neurobridge_core::NeuroError;
use neurobridge_gateway::{GatewayState, start_server};
use neurobridge_objectstore::FsObjectStore;
use neurobridge_services::{Services, engine_from_config, run_reconciler};
use neurobridge_storage::Database;
use tracing::{info, warn};

use crate::shutdown;

pub async fn run_serve(config: NeuroBridgeConfig) -> Result<(), NeuroError> {
    info!("starting neurobridge serve");

    let db = Database::open_with(&config.storage).await?;
    let store = Arc::new(FsObjectStore::from_config(&config.object_store));
    let engine = engine_from_config(&config.workflow)?;
    let services = Services::build(db, store, engine, &config)?;

    let cancel = shutdown::install_signal_handler();

    let reconciler = if config.workflow.reconcile_interval_secs > 0 {
        Some(tokio::spawn(run_reconciler(
            services.jobs.clone(),
            Duration::from_secs(config.workflow.reconcile_interval_secs),
            Duration::from_secs(config.workflow.reconcile_stale_secs),
            cancel.clone(),
        )))
    } else {
        warn!("dispatch reconciler disabled; undispatched jobs stay queued");
        None
    };

    let state = GatewayState::new(services, cancel.clone());
    let served = start_server(&config.server, state).await;

    cancel.cancel();
    if let Some(handle) = reconciler
        && let Err(e) = handle.await
    {
        warn!(error = %e, "reconciler task ended abnormally");
    }
    info!("neurobridge stopped");
    served
}

pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("neurobridge={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
