// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upload-and-start-build: the one operation that spans materials, path,
//! chat and job ledger.
//!
//! Everything up to and including the job row is written in a single
//! transaction. The workflow engine is only called after that transaction
//! committed; if the call fails the caller still receives every persisted
//! id inside [`NeuroError::DispatchFailed`], and the queued job is left for
//! the reconciler.

use neurobridge_core::types::{
    LEARNING_BUILD_JOB, LearningBuild, MaterialFile, MessageRole, NEW_THREAD_TITLE,
};
use neurobridge_core::{Metadata, NeuroError, RequestContext};
use neurobridge_storage::queries::threads::ThreadUpdate;
use neurobridge_storage::{Database, Tx};
use serde_json::json;
use tracing::{info, warn};

use crate::chat::{ChatWriter, MESSAGE_PENDING, MESSAGE_SENT, NewMessage};
use crate::jobs::{JobLedger, NewJob};
use crate::materials::{FileUpload, MaterialService};
use crate::paths::PathBootstrap;

#[derive(Clone)]
pub struct LearningBuildOrchestrator {
    db: Database,
    materials: MaterialService,
    paths: PathBootstrap,
    chat: ChatWriter,
    jobs: JobLedger,
}

impl LearningBuildOrchestrator {
    pub fn new(
        db: Database,
        materials: MaterialService,
        paths: PathBootstrap,
        chat: ChatWriter,
        jobs: JobLedger,
    ) -> Self {
        Self {
            db,
            materials,
            paths,
            chat,
            jobs,
        }
    }

    /// Persist uploads and an optional prompt, bind them to a path and a
    /// chat thread, enqueue the `learning_build` job, then dispatch it.
    pub async fn upload_materials_and_start_learning_build_with_chat(
        &self,
        ctx: &RequestContext,
        uploads: Vec<FileUpload>,
        prompt: Option<&str>,
    ) -> Result<LearningBuild, NeuroError> {
        let user_id = ctx.user_id()?.to_string();
        let prompt = prompt.map(str::trim).filter(|p| !p.is_empty());
        if uploads.is_empty() && prompt.is_none() {
            return Err(NeuroError::Validation("no files or prompt".into()));
        }
        ctx.check_cancelled()?;

        let tx = self.db.begin().await?;
        let (material_set, files) = if uploads.is_empty() {
            let set = self.materials.create_material_set(&tx, &user_id).await?;
            (set, Vec::new())
        } else {
            self.materials
                .upload_material_files(Some(&tx), &user_id, uploads, ctx.cancellation())
                .await?
        };

        let persisted = self
            .persist_build(&tx, &user_id, material_set, files.clone(), prompt)
            .await;
        let build = match persisted {
            Ok(build) => build,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "rollback after failed learning build also failed");
                }
                self.materials.discard_blobs(&files).await;
                return Err(e);
            }
        };
        if let Err(e) = ctx.check_cancelled() {
            if let Err(rb) = tx.rollback().await {
                warn!(error = %rb, "rollback after cancellation failed");
            }
            self.materials.discard_blobs(&files).await;
            return Err(e);
        }
        if let Err(e) = tx.commit().await {
            self.materials.discard_blobs(&files).await;
            return Err(e);
        }
        info!(
            user_id = %user_id,
            material_set_id = %build.material_set.id,
            path_id = %build.path_id,
            thread_id = %build.thread.id,
            job_id = %build.job.id,
            files = build.files.len(),
            "learning build committed"
        );

        match self.jobs.dispatch(&build.job.id).await {
            Ok(job) => Ok(LearningBuild { job, ..build }),
            Err(e) => {
                warn!(job_id = %build.job.id, error = %e, "learning build committed but dispatch failed");
                Err(NeuroError::DispatchFailed {
                    job_id: build.job.id.clone(),
                    build: Some(Box::new(build)),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Path, thread, seed messages, job and backlinks, all inside `tx`.
    async fn persist_build(
        &self,
        tx: &Tx,
        user_id: &str,
        material_set: neurobridge_core::types::MaterialSet,
        files: Vec<MaterialFile>,
        prompt: Option<&str>,
    ) -> Result<LearningBuild, NeuroError> {
        let set_id = material_set.id.clone();
        let path_id = self.paths.ensure_path(Some(tx), user_id, &set_id).await?;

        let thread_meta = object(json!({
            "material_set_id": set_id,
            "path_id": path_id,
            "kind": "path_build",
        }));
        let mut thread = self
            .chat
            .create_thread(tx, user_id, Some(&path_id), NEW_THREAD_TITLE, thread_meta)
            .await?;

        if let Some(prompt) = prompt {
            self.chat
                .append_message(
                    tx,
                    NewMessage {
                        thread_id: thread.id.clone(),
                        user_id: user_id.to_string(),
                        role: MessageRole::User,
                        content: prompt.to_string(),
                        status: MESSAGE_SENT.to_string(),
                        metadata: Metadata::new(),
                    },
                )
                .await?;
        }

        let mut payload = object(json!({
            "material_set_id": set_id,
            "path_id": path_id,
            "thread_id": thread.id,
        }));
        if let Some(prompt) = prompt {
            payload.insert("prompt".into(), json!(prompt));
        }
        let job = self
            .jobs
            .enqueue(
                tx,
                NewJob {
                    owner_user_id: user_id.to_string(),
                    job_type: LEARNING_BUILD_JOB.to_string(),
                    entity_type: "material_set".to_string(),
                    entity_id: set_id.clone(),
                    payload,
                },
            )
            .await?;

        self.chat
            .update_thread_fields(
                tx,
                &thread.id,
                &ThreadUpdate {
                    job_id: Some(job.id.clone()),
                    ..ThreadUpdate::default()
                },
            )
            .await?;
        self.paths.set_path_job(tx, &path_id, &job.id).await?;

        let placeholder = self
            .chat
            .append_message(
                tx,
                NewMessage {
                    thread_id: thread.id.clone(),
                    user_id: user_id.to_string(),
                    role: MessageRole::Assistant,
                    content: String::new(),
                    status: MESSAGE_PENDING.to_string(),
                    metadata: object(json!({
                        "kind": "path_generation",
                        "material_set_id": set_id,
                        "path_id": path_id,
                        "job_id": job.id,
                    })),
                },
            )
            .await?;

        thread.job_id = Some(job.id.clone());
        thread.next_seq = placeholder.seq;
        thread.last_message_at = placeholder.created_at.clone();
        thread.updated_at = placeholder.created_at;

        Ok(LearningBuild {
            material_set,
            files,
            path_id,
            thread,
            job,
        })
    }
}

fn object(value: serde_json::Value) -> Metadata {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurobridge_core::types::{JobState, MaterialFileInput, MaterialSetStatus, PathStatus};
    use neurobridge_storage::queries::{jobs, materials, messages, paths, threads};
    use neurobridge_test_utils::{MemoryObjectStore, MockWorkflowEngine, authenticated, seed_user};
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        db: Database,
        store: Arc<MemoryObjectStore>,
        engine: Arc<MockWorkflowEngine>,
        orchestrator: LearningBuildOrchestrator,
    }

    async fn fixture() -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        seed_user(&db, "u1").await;
        let store = Arc::new(MemoryObjectStore::new());
        let engine = Arc::new(MockWorkflowEngine::new());
        let orchestrator = LearningBuildOrchestrator::new(
            db.clone(),
            MaterialService::new(db.clone(), store.clone()),
            PathBootstrap::new(db.clone()),
            ChatWriter::new(db.clone()),
            JobLedger::new(db.clone(), engine.clone(), Duration::from_secs(1)),
        );
        Fixture {
            db,
            store,
            engine,
            orchestrator,
        }
    }

    fn pdf() -> FileUpload {
        FileUpload {
            input: MaterialFileInput {
                original_name: "notes.pdf".into(),
                mime_type: "application/pdf".into(),
                size_bytes: 4,
            },
            reader: Box::pin(&b"%PDF"[..]),
        }
    }

    #[tokio::test]
    async fn upload_with_prompt_builds_everything() {
        let f = fixture().await;
        let build = f
            .orchestrator
            .upload_materials_and_start_learning_build_with_chat(
                &authenticated("u1"),
                vec![pdf()],
                Some("help me learn this"),
            )
            .await
            .unwrap();

        assert_eq!(build.material_set.status, MaterialSetStatus::Uploaded);
        assert_eq!(build.files.len(), 1);
        assert_eq!(build.thread.next_seq, 2);
        assert_eq!(build.job.status, JobState::Dispatched);
        assert_eq!(f.store.len(), 1);

        let path = paths::get_path(&f.db, &build.path_id).await.unwrap().unwrap();
        assert_eq!(path.status, PathStatus::Draft);
        assert_eq!(path.job_id.as_deref(), Some(build.job.id.as_str()));

        let thread = threads::get_thread(&f.db, &build.thread.id).await.unwrap().unwrap();
        assert_eq!(thread.job_id.as_deref(), Some(build.job.id.as_str()));
        assert_eq!(thread.metadata["kind"], "path_build");

        let msgs = messages::list_messages(&f.db, &thread.id, 0, 10).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, MessageRole::User);
        assert_eq!(msgs[0].content, "help me learn this");
        assert_eq!(msgs[1].role, MessageRole::Assistant);
        assert_eq!(msgs[1].content, "");
        assert_eq!(msgs[1].metadata["job_id"], build.job.id.as_str());

        let job = jobs::get_job(&f.db, &build.job.id).await.unwrap().unwrap();
        assert_eq!(job.payload["prompt"], "help me learn this");
        assert_eq!(job.payload["thread_id"], thread.id.as_str());
        assert_eq!(f.engine.dispatched_ids(), vec![build.job.id.clone()]);
    }

    #[tokio::test]
    async fn neither_files_nor_prompt_is_rejected_before_writing() {
        let f = fixture().await;
        let err = f
            .orchestrator
            .upload_materials_and_start_learning_build_with_chat(
                &authenticated("u1"),
                Vec::new(),
                Some("   "),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NeuroError::Validation(ref m) if m == "no files or prompt"));
        assert!(materials::list_sets_for_user(&f.db, "u1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn anonymous_callers_are_rejected() {
        let f = fixture().await;
        let err = f
            .orchestrator
            .upload_materials_and_start_learning_build_with_chat(
                &RequestContext::anonymous(),
                Vec::new(),
                Some("hi"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NeuroError::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn dispatch_failure_still_returns_persisted_ids() {
        let f = fixture().await;
        f.engine.fail_next(1);
        let err = f
            .orchestrator
            .upload_materials_and_start_learning_build_with_chat(
                &authenticated("u1"),
                Vec::new(),
                Some("teach me Rust ownership"),
            )
            .await
            .unwrap_err();

        let NeuroError::DispatchFailed { job_id, build, .. } = err else {
            panic!("expected DispatchFailed, got {err:?}");
        };
        let build = build.expect("build carried");
        assert_eq!(build.job.id, job_id);
        let job = jobs::get_job(&f.db, &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobState::Queued);
        assert!(threads::get_thread(&f.db, &build.thread.id).await.unwrap().is_some());
    }
}
