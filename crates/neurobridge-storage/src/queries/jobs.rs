// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job run ledger queries.
//!
//! State changes are compare-and-set on the current status so that a
//! concurrent transition can never be silently overwritten.

use neurobridge_core::NeuroError;
use neurobridge_core::types::{JobRun, JobState};
use rusqlite::{OptionalExtension, params};

use crate::database::Executor;
use crate::queries::{enum_column, json_column, json_text};

const JOB_COLUMNS: &str = "id, owner_user_id, job_type, entity_type, entity_id, payload, status, stage, progress, attempts, error, saga_id, created_at, updated_at, dispatched_at, completed_at";

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRun> {
    Ok(JobRun {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        job_type: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        payload: json_column(row, 5)?,
        status: enum_column(row, 6)?,
        stage: row.get(7)?,
        progress: row.get(8)?,
        attempts: row.get(9)?,
        error: row.get(10)?,
        saga_id: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        dispatched_at: row.get(14)?,
        completed_at: row.get(15)?,
    })
}

pub async fn insert_job(db: &impl Executor, job: &JobRun) -> Result<(), NeuroError> {
    let job = job.clone();
    db.call(move |conn| {
        conn.execute(
            &format!(
                "INSERT INTO job_runs ({JOB_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                job.id,
                job.owner_user_id,
                job.job_type,
                job.entity_type,
                job.entity_id,
                json_text(&job.payload),
                job.status.to_string(),
                job.stage,
                job.progress,
                job.attempts,
                job.error,
                job.saga_id,
                job.created_at,
                job.updated_at,
                job.dispatched_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
    .await
}

pub async fn get_job(db: &impl Executor, id: &str) -> Result<Option<JobRun>, NeuroError> {
    let id = id.to_string();
    db.query(move |conn| {
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM job_runs WHERE id = ?1"),
            params![id],
            row_to_job,
        )
        .optional()
    })
    .await
}

/// A user's runs, newest first.
pub async fn list_jobs_for_owner(
    db: &impl Executor,
    owner_user_id: &str,
    limit: i64,
) -> Result<Vec<JobRun>, NeuroError> {
    let owner_user_id = owner_user_id.to_string();
    db.query(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM job_runs WHERE owner_user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![owner_user_id, limit], row_to_job)?;
        rows.collect()
    })
    .await
}

/// Most recent run owned by `owner_user_id` for the given entity.
pub async fn latest_job_for_entity(
    db: &impl Executor,
    owner_user_id: &str,
    entity_id: &str,
) -> Result<Option<JobRun>, NeuroError> {
    let owner_user_id = owner_user_id.to_string();
    let entity_id = entity_id.to_string();
    db.query(move |conn| {
        conn.query_row(
            &format!(
                "SELECT {JOB_COLUMNS} FROM job_runs
                 WHERE owner_user_id = ?1 AND entity_id = ?2
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            params![owner_user_id, entity_id],
            row_to_job,
        )
        .optional()
    })
    .await
}

/// Claim a queued job for one dispatch attempt until `claimed_until`.
///
/// Counts the attempt. Returns false when the job is no longer queued or
/// another dispatcher holds an unexpired claim.
pub async fn claim_for_dispatch(
    db: &impl Executor,
    id: &str,
    now: &str,
    claimed_until: &str,
) -> Result<bool, NeuroError> {
    let id = id.to_string();
    let now = now.to_string();
    let claimed_until = claimed_until.to_string();
    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE job_runs
             SET attempts = attempts + 1, claimed_until = ?3, updated_at = ?2
             WHERE id = ?1 AND status = 'queued'
               AND (claimed_until IS NULL OR claimed_until <= ?2)",
            params![id, now, claimed_until],
        )?;
        Ok(changed > 0)
    })
    .await
}

/// Move a queued job to dispatched. Returns false if it was no longer queued.
pub async fn mark_dispatched(db: &impl Executor, id: &str, now: &str) -> Result<bool, NeuroError> {
    let id = id.to_string();
    let now = now.to_string();
    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE job_runs
             SET status = 'dispatched', error = NULL, claimed_until = NULL,
                 dispatched_at = ?2, updated_at = ?2
             WHERE id = ?1 AND status = 'queued'",
            params![id, now],
        )?;
        Ok(changed > 0)
    })
    .await
}

/// Record a failed dispatch attempt and release its claim; the job stays
/// queued.
pub async fn record_dispatch_failure(
    db: &impl Executor,
    id: &str,
    error: &str,
    now: &str,
) -> Result<bool, NeuroError> {
    let id = id.to_string();
    let error = error.to_string();
    let now = now.to_string();
    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE job_runs SET error = ?2, claimed_until = NULL, updated_at = ?3
             WHERE id = ?1 AND status = 'queued'",
            params![id, error, now],
        )?;
        Ok(changed > 0)
    })
    .await
}

/// Fields written alongside a state change.
#[derive(Debug, Clone, Default)]
pub struct JobProgress {
    pub stage: Option<String>,
    pub progress: Option<i64>,
    pub error: Option<String>,
}

/// Compare-and-set transition from `from` to `to`.
///
/// Terminal targets also stamp `completed_at`. Returns false when the row
/// is missing or no longer in `from`.
pub async fn transition_job(
    db: &impl Executor,
    id: &str,
    from: JobState,
    to: JobState,
    progress: &JobProgress,
    now: &str,
) -> Result<bool, NeuroError> {
    let id = id.to_string();
    let progress = progress.clone();
    let now = now.to_string();
    let completed_at = to.is_terminal().then(|| now.clone());
    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE job_runs
             SET status = ?3,
                 stage = COALESCE(?4, stage),
                 progress = COALESCE(?5, progress),
                 error = COALESCE(?6, error),
                 completed_at = COALESCE(?7, completed_at),
                 updated_at = ?8
             WHERE id = ?1 AND status = ?2",
            params![
                id,
                from.to_string(),
                to.to_string(),
                progress.stage,
                progress.progress,
                progress.error,
                completed_at,
                now,
            ],
        )?;
        Ok(changed > 0)
    })
    .await
}

/// Queued jobs last touched before `before`, oldest first.
pub async fn list_stale_queued(
    db: &impl Executor,
    before: &str,
    limit: i64,
) -> Result<Vec<JobRun>, NeuroError> {
    let before = before.to_string();
    db.query(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM job_runs
             WHERE status = 'queued' AND updated_at < ?1
             ORDER BY updated_at ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![before, limit], row_to_job)?;
        rows.collect()
    })
    .await
}
