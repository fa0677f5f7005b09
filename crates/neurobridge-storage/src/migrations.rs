// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL files under `migrations/` are compiled into the binary and applied
//! on every [`Database::open`](crate::Database::open).

use neurobridge_core::NeuroError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
///
/// Refinery tracks applied migrations in `refinery_schema_history`.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<usize, NeuroError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(NeuroError::storage)?;
    Ok(report.applied_migrations().len())
}
