// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotent path materialization, one path per (user, material set).

use neurobridge_core::types::{
    DRAFT_PATH_TITLE, LibraryIndexEntry, Path, PathStatus, now_timestamp,
};
use neurobridge_core::{Metadata, NeuroError, RequestContext};
use neurobridge_storage::queries::{library, paths};
use neurobridge_storage::{Database, Tx};
use tracing::{debug, info};

use crate::new_id;

#[derive(Clone)]
pub struct PathBootstrap {
    db: Database,
}

impl PathBootstrap {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Return the path bound to `(user_id, set_id)`, creating a draft one
    /// on first use.
    ///
    /// The library-index read happens inside a write transaction, so
    /// concurrent callers for the same pair serialize and all see one id.
    /// Opens its own transaction when `tx` is `None`.
    pub async fn ensure_path(
        &self,
        tx: Option<&Tx>,
        user_id: &str,
        set_id: &str,
    ) -> Result<String, NeuroError> {
        if user_id.is_empty() || set_id.is_empty() {
            return Err(NeuroError::Validation(
                "ensure_path needs a user and a material set".into(),
            ));
        }
        match tx {
            Some(tx) => self.ensure_in(tx, user_id, set_id).await,
            None => {
                let tx = self.db.begin().await?;
                let path_id = self.ensure_in(&tx, user_id, set_id).await?;
                tx.commit().await?;
                Ok(path_id)
            }
        }
    }

    async fn ensure_in(&self, tx: &Tx, user_id: &str, set_id: &str) -> Result<String, NeuroError> {
        let entry = library::get_entry(tx, user_id, set_id).await?;
        if let Some(path_id) = entry
            .as_ref()
            .and_then(|e| e.path_id.as_deref())
            .filter(|id| !id.is_empty())
        {
            debug!(user_id, set_id, path_id, "reusing existing path");
            return Ok(path_id.to_string());
        }

        let now = now_timestamp();
        let path = Path {
            id: new_id(),
            user_id: Some(user_id.to_string()),
            title: DRAFT_PATH_TITLE.to_string(),
            description: String::new(),
            status: PathStatus::Draft,
            metadata: Metadata::new(),
            job_id: None,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        paths::insert_path(tx, &path).await?;

        let entry = match entry {
            Some(existing) => LibraryIndexEntry {
                path_id: Some(path.id.clone()),
                updated_at: now,
                ..existing
            },
            None => LibraryIndexEntry {
                id: new_id(),
                user_id: user_id.to_string(),
                material_set_id: set_id.to_string(),
                path_id: Some(path.id.clone()),
                created_at: now.clone(),
                updated_at: now,
            },
        };
        library::upsert_entry(tx, &entry).await?;

        info!(user_id, set_id, path_id = %path.id, "draft path created");
        Ok(path.id)
    }

    /// Backlink a path to the job that builds it.
    pub async fn set_path_job(&self, tx: &Tx, path_id: &str, job_id: &str) -> Result<(), NeuroError> {
        if paths::set_path_job(tx, path_id, job_id, &now_timestamp()).await? {
            Ok(())
        } else {
            Err(NeuroError::not_found("path", path_id))
        }
    }

    /// One of the caller's paths.
    pub async fn get_path(&self, ctx: &RequestContext, path_id: &str) -> Result<Path, NeuroError> {
        let user_id = ctx.user_id()?;
        paths::get_path(&self.db, path_id)
            .await?
            .filter(|p| p.user_id.as_deref() == Some(user_id))
            .ok_or_else(|| NeuroError::not_found("path", path_id))
    }

    pub async fn list_paths(&self, ctx: &RequestContext, limit: i64) -> Result<Vec<Path>, NeuroError> {
        paths::list_paths_for_user(&self.db, ctx.user_id()?, limit).await
    }
}
