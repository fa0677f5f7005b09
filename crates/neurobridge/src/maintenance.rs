// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot maintenance commands: `migrate`, `reconcile`, `check-config`.

use std::time::Duration;

use neurobridge_config::model::NeuroBridgeConfig;
use neurobridge_config::validation::MIN_JWT_SECRET_LEN;
use neurobridge_core::NeuroError;
use neurobridge_llm::LlmClient;
use neurobridge_services::{JobLedger, engine_from_config};
use neurobridge_storage::Database;

/// Open the database, which applies any pending migrations.
pub async fn run_migrate(config: &NeuroBridgeConfig) -> Result<(), NeuroError> {
    Database::open_with(&config.storage).await?;
    println!(
        "database at {} is up to date",
        config.storage.database_path
    );
    Ok(())
}

/// One reconciler pass over jobs queued longer than the stale threshold.
pub async fn run_reconcile(config: &NeuroBridgeConfig) -> Result<(), NeuroError> {
    let db = Database::open_with(&config.storage).await?;
    let engine = engine_from_config(&config.workflow)?;
    let ledger = JobLedger::new(
        db,
        engine,
        Duration::from_secs(config.workflow.dispatch_timeout_secs),
    );
    let report = ledger
        .redispatch_stale(Duration::from_secs(config.workflow.reconcile_stale_secs))
        .await?;
    println!(
        "examined {} stale job(s): {} dispatched, {} failed",
        report.examined, report.dispatched, report.failed
    );
    Ok(())
}

/// Print the effective configuration summary and anything `serve` would
/// reject or run degraded without.
pub fn run_check_config(config: &NeuroBridgeConfig) {
    for line in config_report(config) {
        println!("{line}");
    }
}

fn config_report(config: &NeuroBridgeConfig) -> Vec<String> {
    let mut lines = vec![
        format!("server: {}:{}", config.server.host, config.server.port),
        format!("storage: {}", config.storage.database_path),
        format!("object store: {}", config.object_store.root_dir),
    ];

    match config.auth.jwt_secret.as_deref() {
        Some(secret) if secret.len() >= MIN_JWT_SECRET_LEN => lines.push("auth: ok".into()),
        _ => lines.push("auth: jwt_secret missing, `serve` will refuse to start".into()),
    }

    match config.workflow.engine_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => lines.push(format!("workflow engine: {url}")),
        None => lines.push("workflow engine: none, jobs will only be logged".into()),
    }

    match LlmClient::from_config(&config.llm) {
        Ok(_) => lines.push(format!("llm: {} ({})", config.llm.base_url, config.llm.chat_model)),
        Err(e) => lines.push(format!("llm: unavailable ({e})")),
    }

    lines.push(format!(
        "gaze: {}",
        if config.gaze.enabled { "enabled" } else { "disabled" }
    ));
    lines
}
