// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits for the external collaborators the core consumes.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod object_store;
pub mod workflow;

pub use adapter::PluginAdapter;
pub use object_store::{BlobReader, ObjectStore};
pub use workflow::WorkflowEngine;
