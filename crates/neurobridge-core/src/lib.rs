// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the NeuroBridge learning backend.
//!
//! This crate provides the domain entities, the shared error type, the
//! per-request context, and the adapter traits for the external
//! collaborators (object storage, workflow engine) that the services consume.

pub mod context;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use context::{Identity, RequestContext};
pub use error::{ErrorKind, NeuroError};
pub use types::{AdapterType, HealthStatus, Metadata};

pub use traits::{BlobReader, ObjectStore, PluginAdapter, WorkflowEngine};
