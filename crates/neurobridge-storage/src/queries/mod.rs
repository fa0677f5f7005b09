// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.
//!
//! Every function is generic over [`Executor`](crate::Executor) so it can run
//! either on the shared [`Database`](crate::Database) or inside a [`Tx`](crate::Tx).

pub mod gaze;
pub mod jobs;
pub mod library;
pub mod materials;
pub mod messages;
pub mod paths;
pub mod prefs;
pub mod threads;
pub mod tokens;
pub mod users;

use std::str::FromStr;

use neurobridge_core::Metadata;
use rusqlite::types::Type;

/// Decode a TEXT column holding a JSON object.
pub(crate) fn json_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Metadata> {
    let raw: String = row.get(idx)?;
    if raw.is_empty() {
        return Ok(Metadata::new());
    }
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode a TEXT column holding a snake_case status enum.
pub(crate) fn enum_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn json_text(value: &Metadata) -> String {
    serde_json::Value::Object(value.clone()).to_string()
}
