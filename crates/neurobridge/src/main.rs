// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! NeuroBridge - learning backend server and maintenance CLI.
//!
//! This is the binary entry point.

mod maintenance;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use neurobridge_config::model::NeuroBridgeConfig;

/// NeuroBridge - learning backend server and maintenance CLI.
#[derive(Parser, Debug)]
#[command(name = "neurobridge", version, about, long_about = None)]
struct Cli {
    /// Explicit config file; defaults to the XDG lookup chain.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP gateway and the dispatch reconciler.
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Run one reconciler pass over stale queued jobs.
    Reconcile,
    /// Load and validate configuration, then report what `serve` would use.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => neurobridge_config::load_and_validate_path(path),
        None => neurobridge_config::load_and_validate(),
    };
    let config: NeuroBridgeConfig = match loaded {
        Ok(config) => config,
        Err(errors) => {
            neurobridge_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    serve::init_tracing(&config.server.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Migrate) => maintenance::run_migrate(&config).await,
        Some(Commands::Reconcile) => maintenance::run_reconcile(&config).await,
        Some(Commands::CheckConfig) => {
            maintenance::run_check_config(&config);
            Ok(())
        }
        None => {
            println!("neurobridge: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
