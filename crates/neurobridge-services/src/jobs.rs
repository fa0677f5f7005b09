// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The job ledger: durable job rows plus post-commit dispatch.
//!
//! Enqueueing is a pure database write inside the caller's transaction.
//! Dispatch happens afterwards, outside any transaction, so the workflow
//! engine never sees a job whose row could still be rolled back. A job that
//! committed but was never dispatched stays `queued` until
//! [`JobLedger::redispatch_stale`] picks it up.

use std::sync::Arc;
use std::time::Duration;

use neurobridge_core::types::{JobRun, JobState, format_timestamp, now_timestamp};
use neurobridge_core::{Metadata, NeuroError, RequestContext, WorkflowEngine};
use neurobridge_storage::queries::jobs::{self, JobProgress};
use neurobridge_storage::{Database, Tx};
use tracing::{debug, info, warn};

use crate::new_id;

/// Reconciler passes look at no more than this many rows.
const RECONCILE_BATCH: i64 = 100;

/// A dispatch claim outlives the engine timeout by this much.
const CLAIM_MARGIN: Duration = Duration::from_secs(5);

/// A job to be written by [`JobLedger::enqueue`].
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner_user_id: String,
    pub job_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: Metadata,
}

/// Outcome of one reconciler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub dispatched: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct JobLedger {
    db: Database,
    engine: Arc<dyn WorkflowEngine>,
    dispatch_timeout: Duration,
}

impl JobLedger {
    pub fn new(db: Database, engine: Arc<dyn WorkflowEngine>, dispatch_timeout: Duration) -> Self {
        Self {
            db,
            engine,
            dispatch_timeout,
        }
    }

    /// Write a `queued` job row. No external side effects.
    pub async fn enqueue(&self, tx: &Tx, job: NewJob) -> Result<JobRun, NeuroError> {
        if job.owner_user_id.is_empty() || job.job_type.is_empty() || job.entity_id.is_empty() {
            return Err(NeuroError::Validation(
                "job needs an owner, a type and an entity".into(),
            ));
        }
        let now = now_timestamp();
        let run = JobRun {
            id: new_id(),
            owner_user_id: job.owner_user_id,
            job_type: job.job_type,
            entity_type: job.entity_type,
            entity_id: job.entity_id,
            payload: job.payload,
            status: JobState::Queued,
            stage: None,
            progress: 0,
            attempts: 0,
            error: None,
            saga_id: None,
            created_at: now.clone(),
            updated_at: now,
            dispatched_at: None,
            completed_at: None,
        };
        jobs::insert_job(tx, &run).await?;
        debug!(job_id = %run.id, job_type = %run.job_type, "job enqueued");
        Ok(run)
    }

    /// Hand a committed job to the workflow engine.
    ///
    /// Must not be called while a [`Tx`] is open. A job that is no longer
    /// queued, or that another caller is dispatching right now, is returned
    /// unchanged. On engine failure or timeout the attempt is recorded and
    /// the job stays queued.
    pub async fn dispatch(&self, job_id: &str) -> Result<JobRun, NeuroError> {
        let job = jobs::get_job(&self.db, job_id)
            .await?
            .ok_or_else(|| NeuroError::not_found("job_run", job_id))?;
        if job.status != JobState::Queued {
            debug!(job_id, status = %job.status, "job already past queued, skipping dispatch");
            return Ok(job);
        }

        let lease = chrono::Duration::from_std(self.dispatch_timeout.saturating_add(CLAIM_MARGIN))
            .map_err(|e| NeuroError::Validation(format!("dispatch timeout out of range: {e}")))?;
        let now = chrono::Utc::now();
        let claimed = jobs::claim_for_dispatch(
            &self.db,
            job_id,
            &format_timestamp(now),
            &format_timestamp(now + lease),
        )
        .await?;
        if !claimed {
            debug!(job_id, "job claimed by another dispatcher, skipping");
            return jobs::get_job(&self.db, job_id)
                .await?
                .ok_or_else(|| NeuroError::not_found("job_run", job_id));
        }

        let result = match tokio::time::timeout(self.dispatch_timeout, self.engine.dispatch(&job)).await {
            Ok(result) => result,
            Err(_) => Err(NeuroError::Timeout {
                duration: self.dispatch_timeout,
            }),
        };

        if let Err(e) = result {
            warn!(job_id, engine = self.engine.name(), error = %e, "job dispatch failed");
            jobs::record_dispatch_failure(&self.db, job_id, &e.to_string(), &now_timestamp())
                .await?;
            return Err(e);
        }

        if jobs::mark_dispatched(&self.db, job_id, &now_timestamp()).await? {
            info!(job_id, engine = self.engine.name(), "job dispatched");
        } else {
            debug!(job_id, "job left queued state during dispatch");
        }
        jobs::get_job(&self.db, job_id)
            .await?
            .ok_or_else(|| NeuroError::not_found("job_run", job_id))
    }

    /// Move a job to `to`, writing the given progress fields.
    ///
    /// Rejects moves the state machine does not allow, and moves that race
    /// another writer, with a conflict.
    pub async fn transition(
        &self,
        job_id: &str,
        to: JobState,
        progress: JobProgress,
    ) -> Result<JobRun, NeuroError> {
        let job = jobs::get_job(&self.db, job_id)
            .await?
            .ok_or_else(|| NeuroError::not_found("job_run", job_id))?;
        if !job.status.can_transition_to(to) {
            return Err(NeuroError::Conflict(format!(
                "job {job_id} cannot move from {} to {to}",
                job.status
            )));
        }
        let changed =
            jobs::transition_job(&self.db, job_id, job.status, to, &progress, &now_timestamp())
                .await?;
        if !changed {
            return Err(NeuroError::Conflict(format!(
                "job {job_id} changed state concurrently"
            )));
        }
        info!(job_id, from = %job.status, to = %to, "job transitioned");
        jobs::get_job(&self.db, job_id)
            .await?
            .ok_or_else(|| NeuroError::not_found("job_run", job_id))
    }

    /// Cancel one of the caller's jobs.
    pub async fn cancel(&self, ctx: &RequestContext, job_id: &str) -> Result<JobRun, NeuroError> {
        self.get_run_by_id(ctx, job_id).await?;
        self.transition(
            job_id,
            JobState::Cancelled,
            JobProgress {
                error: Some("cancelled by user".into()),
                ..JobProgress::default()
            },
        )
        .await
    }

    /// A run, visible only to its owner.
    pub async fn get_run_by_id(&self, ctx: &RequestContext, job_id: &str) -> Result<JobRun, NeuroError> {
        let user_id = ctx.user_id()?;
        jobs::get_job(&self.db, job_id)
            .await?
            .filter(|j| j.owner_user_id == user_id)
            .ok_or_else(|| NeuroError::not_found("job_run", job_id))
    }

    /// The caller's most recent run for a course (the job's entity).
    pub async fn get_latest_run_for_course(
        &self,
        ctx: &RequestContext,
        course_id: &str,
    ) -> Result<JobRun, NeuroError> {
        let user_id = ctx.user_id()?;
        jobs::latest_job_for_entity(&self.db, user_id, course_id)
            .await?
            .ok_or_else(|| NeuroError::not_found("job_run", course_id))
    }

    pub async fn list_runs(&self, ctx: &RequestContext, limit: i64) -> Result<Vec<JobRun>, NeuroError> {
        jobs::list_jobs_for_owner(&self.db, ctx.user_id()?, limit).await
    }

    /// Re-dispatch queued jobs untouched for longer than `older_than`.
    ///
    /// Individual dispatch failures are counted, not returned.
    pub async fn redispatch_stale(&self, older_than: Duration) -> Result<ReconcileReport, NeuroError> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| NeuroError::Validation(format!("stale threshold out of range: {e}")))?;
        let cutoff = format_timestamp(chrono::Utc::now() - age);
        let stale = jobs::list_stale_queued(&self.db, &cutoff, RECONCILE_BATCH).await?;

        let mut report = ReconcileReport {
            examined: stale.len(),
            ..ReconcileReport::default()
        };
        for job in stale {
            match self.dispatch(&job.id).await {
                Ok(run) if run.status == JobState::Dispatched => report.dispatched += 1,
                Ok(_) => {}
                Err(_) => report.failed += 1,
            }
        }
        if report.examined > 0 {
            info!(
                examined = report.examined,
                dispatched = report.dispatched,
                failed = report.failed,
                "reconciler pass finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurobridge_core::types::LEARNING_BUILD_JOB;
    use neurobridge_test_utils::{MockWorkflowEngine, authenticated, seed_user};

    async fn setup(engine: Arc<MockWorkflowEngine>) -> (Database, JobLedger) {
        let db = Database::open_in_memory().await.unwrap();
        seed_user(&db, "u1").await;
        seed_user(&db, "u2").await;
        let ledger = JobLedger::new(db.clone(), engine, Duration::from_millis(200));
        (db, ledger)
    }

    fn new_job(entity_id: &str) -> NewJob {
        NewJob {
            owner_user_id: "u1".into(),
            job_type: LEARNING_BUILD_JOB.into(),
            entity_type: "material_set".into(),
            entity_id: entity_id.into(),
            payload: Metadata::new(),
        }
    }

    async fn enqueue_committed(db: &Database, ledger: &JobLedger, entity_id: &str) -> JobRun {
        let tx = db.begin().await.unwrap();
        let job = ledger.enqueue(&tx, new_job(entity_id)).await.unwrap();
        tx.commit().await.unwrap();
        job
    }

    #[tokio::test]
    async fn enqueue_has_no_external_effect() {
        let engine = Arc::new(MockWorkflowEngine::new());
        let (db, ledger) = setup(engine.clone()).await;
        let job = enqueue_committed(&db, &ledger, "s1").await;
        assert_eq!(job.status, JobState::Queued);
        assert!(engine.dispatched_ids().is_empty());
    }

    #[tokio::test]
    async fn dispatch_moves_queued_to_dispatched_once() {
        let engine = Arc::new(MockWorkflowEngine::new());
        let (db, ledger) = setup(engine.clone()).await;
        let job = enqueue_committed(&db, &ledger, "s1").await;

        let run = ledger.dispatch(&job.id).await.unwrap();
        assert_eq!(run.status, JobState::Dispatched);
        assert_eq!(run.attempts, 1);
        assert!(run.dispatched_at.is_some());

        let again = ledger.dispatch(&job.id).await.unwrap();
        assert_eq!(again.status, JobState::Dispatched);
        assert_eq!(engine.dispatched_ids(), vec![job.id]);
    }

    #[tokio::test]
    async fn failed_dispatch_keeps_the_job_queued() {
        let engine = Arc::new(MockWorkflowEngine::new());
        engine.fail_next(1);
        let (db, ledger) = setup(engine.clone()).await;
        let job = enqueue_committed(&db, &ledger, "s1").await;

        let err = ledger.dispatch(&job.id).await.unwrap_err();
        assert!(matches!(err, NeuroError::Dispatch { .. }));
        let stored = jobs::get_job(&db, &job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobState::Queued);
        assert_eq!(stored.attempts, 1);
        assert!(stored.error.is_some());
    }

    #[tokio::test]
    async fn concurrent_dispatch_reaches_the_engine_once() {
        let engine = Arc::new(MockWorkflowEngine::new().with_delay(Duration::from_millis(50)));
        let (db, ledger) = setup(engine.clone()).await;
        let job = enqueue_committed(&db, &ledger, "s1").await;

        // The reconciler racing the request path on the same job.
        let (first, second) = tokio::join!(ledger.dispatch(&job.id), ledger.dispatch(&job.id));
        let statuses = [first.unwrap().status, second.unwrap().status];
        assert!(statuses.contains(&JobState::Dispatched), "got {statuses:?}");
        assert_eq!(engine.dispatched_ids(), vec![job.id.clone()]);
        assert_eq!(engine.calls(), 1);

        let stored = jobs::get_job(&db, &job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobState::Dispatched);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let engine = Arc::new(MockWorkflowEngine::new().with_delay(Duration::from_secs(5)));
        let (db, ledger) = setup(engine).await;
        let job = enqueue_committed(&db, &ledger, "s1").await;

        let err = ledger.dispatch(&job.id).await.unwrap_err();
        assert!(matches!(err, NeuroError::Timeout { .. }));
        let stored = jobs::get_job(&db, &job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobState::Queued);
    }

    #[tokio::test]
    async fn state_machine_is_enforced() {
        let engine = Arc::new(MockWorkflowEngine::new());
        let (db, ledger) = setup(engine).await;
        let job = enqueue_committed(&db, &ledger, "s1").await;
        ledger.dispatch(&job.id).await.unwrap();

        let running = ledger
            .transition(
                &job.id,
                JobState::Running,
                JobProgress {
                    stage: Some("analyze".into()),
                    progress: Some(10),
                    error: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(running.stage.as_deref(), Some("analyze"));

        let done = ledger
            .transition(&job.id, JobState::Succeeded, JobProgress::default())
            .await
            .unwrap();
        assert!(done.completed_at.is_some());

        let err = ledger
            .transition(&job.id, JobState::Running, JobProgress::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NeuroError::Conflict(_)));
    }

    #[tokio::test]
    async fn observers_are_owner_scoped() {
        let engine = Arc::new(MockWorkflowEngine::new());
        let (db, ledger) = setup(engine).await;
        let older = enqueue_committed(&db, &ledger, "course-1").await;
        let newer = enqueue_committed(&db, &ledger, "course-1").await;

        let owner = authenticated("u1");
        let latest = ledger
            .get_latest_run_for_course(&owner, "course-1")
            .await
            .unwrap();
        assert_eq!(latest.id, newer.id);
        assert_eq!(ledger.get_run_by_id(&owner, &older.id).await.unwrap().id, older.id);

        let stranger = authenticated("u2");
        assert!(matches!(
            ledger.get_run_by_id(&stranger, &older.id).await,
            Err(NeuroError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.get_latest_run_for_course(&stranger, "course-1").await,
            Err(NeuroError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.cancel(&stranger, &older.id).await,
            Err(NeuroError::NotFound { .. })
        ));

        let cancelled = ledger.cancel(&owner, &older.id).await.unwrap();
        assert_eq!(cancelled.status, JobState::Cancelled);
        assert_eq!(ledger.list_runs(&owner, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reconciler_redispatches_stale_queued_jobs() {
        let engine = Arc::new(MockWorkflowEngine::new());
        engine.fail_next(1);
        let (db, ledger) = setup(engine.clone()).await;
        let job = enqueue_committed(&db, &ledger, "s1").await;
        assert!(ledger.dispatch(&job.id).await.is_err());
        // Timestamps have millisecond resolution.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let report = ledger.redispatch_stale(Duration::ZERO).await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                examined: 1,
                dispatched: 1,
                failed: 0
            }
        );
        let stored = jobs::get_job(&db, &job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobState::Dispatched);
        assert_eq!(stored.attempts, 2);

        let idle = ledger.redispatch_stale(Duration::ZERO).await.unwrap();
        assert_eq!(idle.examined, 0);
    }

    #[tokio::test]
    async fn fresh_jobs_are_left_alone_by_the_reconciler() {
        let engine = Arc::new(MockWorkflowEngine::new());
        let (db, ledger) = setup(engine.clone()).await;
        enqueue_committed(&db, &ledger, "s1").await;
        let report = ledger
            .redispatch_stale(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(report.examined, 0);
        assert!(engine.dispatched_ids().is_empty());
    }
}
