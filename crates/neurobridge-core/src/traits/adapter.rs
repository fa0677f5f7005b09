// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that all external-collaborator adapters implement.

use async_trait::async_trait;

use crate::error::NeuroError;
use crate::types::{AdapterType, HealthStatus};

/// Identity and health reporting shared by every adapter.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the kind of collaborator this adapter stands in for.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, NeuroError>;
}
