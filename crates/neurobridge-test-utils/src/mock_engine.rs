// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock workflow engine for deterministic testing.
//!
//! `MockWorkflowEngine` records every accepted job id, can fail a number
//! of upcoming calls, can stall each call, and can look the job up in the
//! database at dispatch time to prove the row was already committed.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use neurobridge_core::types::{AdapterType, HealthStatus, JobRun, JobState};
use neurobridge_core::{NeuroError, PluginAdapter, WorkflowEngine};
use neurobridge_storage::Database;
use neurobridge_storage::queries::jobs;

#[derive(Default)]
struct State {
    dispatched: Vec<String>,
    calls: usize,
    fail_remaining: usize,
    /// Job state as read from the database when dispatch was called.
    observed: Vec<(String, Option<JobState>)>,
}

#[derive(Default)]
pub struct MockWorkflowEngine {
    state: Mutex<State>,
    delay: Option<Duration>,
    database: Option<Database>,
}

impl MockWorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every dispatch call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Read each job back from `db` when it is dispatched.
    pub fn with_database(mut self, db: Database) -> Self {
        self.database = Some(db);
        self
    }

    /// Fail the next `n` dispatch calls.
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_remaining = n;
    }

    /// Ids of jobs the engine accepted, in call order.
    pub fn dispatched_ids(&self) -> Vec<String> {
        self.lock().dispatched.clone()
    }

    /// Every dispatch call, failed ones included.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    pub fn observed(&self) -> Vec<(String, Option<JobState>)> {
        self.lock().observed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PluginAdapter for MockWorkflowEngine {
    fn name(&self) -> &str {
        "mock-workflow-engine"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::WorkflowEngine
    }

    async fn health_check(&self) -> Result<HealthStatus, NeuroError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl WorkflowEngine for MockWorkflowEngine {
    async fn dispatch(&self, job: &JobRun) -> Result<(), NeuroError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let seen = match &self.database {
            Some(db) => Some(jobs::get_job(db, &job.id).await?.map(|j| j.status)),
            None => None,
        };

        let mut state = self.lock();
        state.calls += 1;
        if let Some(status) = seen {
            state.observed.push((job.id.clone(), status));
        }
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(NeuroError::Dispatch {
                message: format!("injected dispatch failure for {}", job.id),
                source: None,
            });
        }
        state.dispatched.push(job.id.clone());
        Ok(())
    }
}
