// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the NeuroBridge backend.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, explicit write transactions
//! ([`Tx`]), and typed query modules for every entity.

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::{Database, Executor, Tx};
