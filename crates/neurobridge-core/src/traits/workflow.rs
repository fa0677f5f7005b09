// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow engine adapter trait.

use async_trait::async_trait;

use crate::error::NeuroError;
use crate::traits::adapter::PluginAdapter;
use crate::types::JobRun;

/// The external engine that executes durable jobs out-of-band.
///
/// The engine is not transactional with the database: callers must only
/// dispatch jobs whose creating transaction has committed.
#[async_trait]
pub trait WorkflowEngine: PluginAdapter {
    /// Hands the job to the engine. Must be idempotent per job id.
    async fn dispatch(&self, job: &JobRun) -> Result<(), NeuroError>;
}
