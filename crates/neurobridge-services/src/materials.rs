// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Material sets, their file rows, and the blob uploads behind them.
//!
//! A file row is always inserted before its blob is written, under the
//! deterministic key `materials/{set_id}/{file_id}`. If anything fails
//! after a blob landed, the blobs written by this call are deleted again
//! so a rolled-back transaction never leaves orphans behind.

use std::sync::Arc;

use neurobridge_core::types::{
    MATERIALS_CATEGORY, MaterialFile, MaterialFileInput, MaterialFileStatus, MaterialSet,
    MaterialSetStatus, material_storage_key, now_timestamp,
};
use neurobridge_core::{BlobReader, NeuroError, ObjectStore, RequestContext};
use neurobridge_storage::queries::materials;
use neurobridge_storage::{Database, Tx};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::new_id;

/// A file description paired with the stream that carries its bytes.
pub struct FileUpload {
    pub input: MaterialFileInput,
    pub reader: BlobReader,
}

impl std::fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileUpload")
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

/// Streams one file's bytes to object storage and records the outcome on
/// its row inside the caller's transaction.
#[derive(Clone)]
pub struct BlobUploader {
    store: Arc<dyn ObjectStore>,
}

impl BlobUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload `reader` for the file row `file_id` in set `set_id`.
    ///
    /// Errors are never swallowed: a failed or cancelled upload marks the
    /// row `upload_failed` (inside `tx`) and returns the error.
    pub async fn upload(
        &self,
        tx: &Tx,
        set_id: &str,
        file_id: &str,
        reader: BlobReader,
        cancel: &CancellationToken,
    ) -> Result<MaterialFile, NeuroError> {
        if set_id.is_empty() || file_id.is_empty() {
            return Err(NeuroError::Internal(
                "blob upload requires both a set id and a file id".into(),
            ));
        }

        let file = materials::get_file(tx, file_id)
            .await?
            .ok_or_else(|| NeuroError::not_found("material_file", file_id))?;
        let key = material_storage_key(set_id, file_id);
        if file.material_set_id != set_id || file.storage_key != key {
            return Err(NeuroError::Internal(format!(
                "file {file_id} row does not carry storage key {key}"
            )));
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NeuroError::Cancelled),
            res = self.store.upload_file(MATERIALS_CATEGORY, &key, reader) => res,
        };

        let now = now_timestamp();
        match outcome {
            Ok(bytes) => {
                let url = self.store.public_url(MATERIALS_CATEGORY, &key);
                materials::set_file_upload_result(
                    tx,
                    file_id,
                    MaterialFileStatus::Uploaded,
                    Some(&url),
                    &now,
                )
                .await?;
                debug!(file_id, key = %key, bytes, "material blob uploaded");
                Ok(MaterialFile {
                    status: MaterialFileStatus::Uploaded,
                    file_url: Some(url),
                    updated_at: now,
                    ..file
                })
            }
            Err(e) => {
                if let Err(mark) = materials::set_file_upload_result(
                    tx,
                    file_id,
                    MaterialFileStatus::UploadFailed,
                    None,
                    &now,
                )
                .await
                {
                    warn!(file_id, error = %mark, "could not mark file upload_failed");
                }
                // The blob may be partially written by a cancelled store call.
                if let Err(cleanup) = self.store.delete_file(MATERIALS_CATEGORY, &key).await {
                    warn!(key = %key, error = %cleanup, "failed to remove blob after upload error");
                }
                match e {
                    NeuroError::Cancelled => Err(NeuroError::Cancelled),
                    other => Err(NeuroError::ObjectStore {
                        message: format!("upload of {key} failed"),
                        source: Some(Box::new(other)),
                    }),
                }
            }
        }
    }
}

/// Material set and file bookkeeping.
#[derive(Clone)]
pub struct MaterialService {
    db: Database,
    store: Arc<dyn ObjectStore>,
    uploader: BlobUploader,
}

impl MaterialService {
    pub fn new(db: Database, store: Arc<dyn ObjectStore>) -> Self {
        let uploader = BlobUploader::new(store.clone());
        Self {
            db,
            store,
            uploader,
        }
    }

    /// Insert a fresh, empty set in `pending` state.
    pub async fn create_material_set(
        &self,
        tx: &Tx,
        user_id: &str,
    ) -> Result<MaterialSet, NeuroError> {
        self.insert_set(tx, user_id, MaterialSetStatus::Pending)
            .await
    }

    async fn insert_set(
        &self,
        tx: &Tx,
        user_id: &str,
        status: MaterialSetStatus,
    ) -> Result<MaterialSet, NeuroError> {
        if user_id.is_empty() {
            return Err(NeuroError::Validation("material set needs an owner".into()));
        }
        let now = now_timestamp();
        let set = MaterialSet {
            id: new_id(),
            user_id: user_id.to_string(),
            status,
            created_at: now.clone(),
            updated_at: now,
        };
        materials::insert_set(tx, &set).await?;
        debug!(user_id, set_id = %set.id, status = %status, "material set created");
        Ok(set)
    }

    /// Insert one `pending_upload` row per input, in input order.
    pub async fn add_material_files(
        &self,
        tx: &Tx,
        set_id: &str,
        inputs: &[MaterialFileInput],
    ) -> Result<Vec<MaterialFile>, NeuroError> {
        let mut files = Vec::with_capacity(inputs.len());
        for input in inputs {
            if input.original_name.trim().is_empty() {
                return Err(NeuroError::Validation("file name must not be blank".into()));
            }
            let now = now_timestamp();
            let id = new_id();
            let file = MaterialFile {
                storage_key: material_storage_key(set_id, &id),
                id,
                material_set_id: set_id.to_string(),
                original_name: input.original_name.clone(),
                mime_type: input.mime_type.clone(),
                size_bytes: input.size_bytes,
                status: MaterialFileStatus::PendingUpload,
                file_url: None,
                created_at: now.clone(),
                updated_at: now,
            };
            materials::insert_file(tx, &file).await?;
            files.push(file);
        }
        Ok(files)
    }

    /// Create a set, insert its file rows, and upload every blob in order.
    ///
    /// With `tx = None` the service opens, and on success commits, its own
    /// transaction. On error, blobs already written by this call are
    /// removed; the caller must roll back a supplied `tx`.
    pub async fn upload_material_files(
        &self,
        tx: Option<&Tx>,
        user_id: &str,
        uploads: Vec<FileUpload>,
        cancel: &CancellationToken,
    ) -> Result<(MaterialSet, Vec<MaterialFile>), NeuroError> {
        match tx {
            Some(tx) => self.upload_in(tx, user_id, uploads, cancel).await,
            None => {
                let tx = self.db.begin().await?;
                let out = self.upload_in(&tx, user_id, uploads, cancel).await?;
                tx.commit().await?;
                Ok(out)
            }
        }
    }

    async fn upload_in(
        &self,
        tx: &Tx,
        user_id: &str,
        uploads: Vec<FileUpload>,
        cancel: &CancellationToken,
    ) -> Result<(MaterialSet, Vec<MaterialFile>), NeuroError> {
        let mut set = self
            .insert_set(tx, user_id, MaterialSetStatus::Uploading)
            .await?;

        let (inputs, readers): (Vec<_>, Vec<_>) =
            uploads.into_iter().map(|u| (u.input, u.reader)).unzip();
        let rows = self.add_material_files(tx, &set.id, &inputs).await?;

        let mut uploaded = Vec::with_capacity(rows.len());
        for (row, reader) in rows.into_iter().zip(readers) {
            match self
                .uploader
                .upload(tx, &set.id, &row.id, reader, cancel)
                .await
            {
                Ok(file) => uploaded.push(file),
                Err(e) => {
                    self.discard_blobs(&uploaded).await;
                    return Err(e);
                }
            }
        }

        let now = now_timestamp();
        if let Err(e) =
            materials::update_set_status(tx, &set.id, MaterialSetStatus::Uploaded, &now).await
        {
            self.discard_blobs(&uploaded).await;
            return Err(e);
        }
        set.status = MaterialSetStatus::Uploaded;
        set.updated_at = now;

        info!(user_id, set_id = %set.id, files = uploaded.len(), "material files uploaded");
        Ok((set, uploaded))
    }

    /// Best-effort removal of the blobs behind `files` that were uploaded.
    pub async fn discard_blobs(&self, files: &[MaterialFile]) {
        for file in files
            .iter()
            .filter(|f| f.status == MaterialFileStatus::Uploaded)
        {
            if let Err(e) = self
                .store
                .delete_file(MATERIALS_CATEGORY, &file.storage_key)
                .await
            {
                warn!(key = %file.storage_key, error = %e, "failed to discard blob");
            }
        }
    }

    /// The caller's sets, newest first.
    pub async fn list_material_sets(
        &self,
        ctx: &RequestContext,
        limit: i64,
    ) -> Result<Vec<MaterialSet>, NeuroError> {
        let user_id = ctx.user_id()?;
        materials::list_sets_for_user(&self.db, user_id, limit).await
    }

    /// One of the caller's sets with its files.
    pub async fn get_material_set(
        &self,
        ctx: &RequestContext,
        set_id: &str,
    ) -> Result<(MaterialSet, Vec<MaterialFile>), NeuroError> {
        let user_id = ctx.user_id()?;
        let set = materials::get_set(&self.db, set_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| NeuroError::not_found("material_set", set_id))?;
        let files = materials::list_files(&self.db, set_id).await?;
        Ok((set, files))
    }

    /// Delete one of the caller's sets, its file rows, and their blobs.
    pub async fn delete_material_set(
        &self,
        ctx: &RequestContext,
        set_id: &str,
    ) -> Result<(), NeuroError> {
        let (_, files) = self.get_material_set(ctx, set_id).await?;
        materials::delete_set(&self.db, set_id).await?;
        self.discard_blobs(&files).await;
        info!(set_id, files = files.len(), "material set deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurobridge_test_utils::{MemoryObjectStore, authenticated, seed_user};

    fn input(name: &str) -> MaterialFileInput {
        MaterialFileInput {
            original_name: name.to_string(),
            mime_type: "text/plain".to_string(),
            size_bytes: 5,
        }
    }

    fn upload(name: &str, body: &'static [u8]) -> FileUpload {
        FileUpload {
            input: input(name),
            reader: Box::pin(body),
        }
    }

    async fn setup() -> (Database, Arc<MemoryObjectStore>, MaterialService) {
        let db = Database::open_in_memory().await.unwrap();
        seed_user(&db, "u1").await;
        let store = Arc::new(MemoryObjectStore::new());
        let service = MaterialService::new(db.clone(), store.clone());
        (db, store, service)
    }

    #[tokio::test]
    async fn create_set_is_pending() {
        let (db, _, service) = setup().await;
        let tx = db.begin().await.unwrap();
        let set = service.create_material_set(&tx, "u1").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(set.status, MaterialSetStatus::Pending);
        let stored = materials::get_set(&db, &set.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MaterialSetStatus::Pending);
    }

    #[tokio::test]
    async fn add_zero_files_is_a_noop() {
        let (db, _, service) = setup().await;
        let tx = db.begin().await.unwrap();
        let set = service.create_material_set(&tx, "u1").await.unwrap();
        let files = service.add_material_files(&tx, &set.id, &[]).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn added_rows_carry_deterministic_keys() {
        let (db, _, service) = setup().await;
        let tx = db.begin().await.unwrap();
        let set = service.create_material_set(&tx, "u1").await.unwrap();
        let files = service
            .add_material_files(&tx, &set.id, &[input("a.txt"), input("b.txt")])
            .await
            .unwrap();
        for file in &files {
            assert_eq!(file.storage_key, format!("materials/{}/{}", set.id, file.id));
            assert_eq!(file.status, MaterialFileStatus::PendingUpload);
        }
    }

    #[tokio::test]
    async fn composite_upload_owns_its_transaction() {
        let (db, store, service) = setup().await;
        let cancel = CancellationToken::new();
        let (set, files) = service
            .upload_material_files(None, "u1", vec![upload("a.txt", b"hello")], &cancel)
            .await
            .unwrap();

        assert_eq!(set.status, MaterialSetStatus::Uploaded);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].status, MaterialFileStatus::Uploaded);
        assert_eq!(
            store.get(MATERIALS_CATEGORY, &files[0].storage_key).unwrap(),
            b"hello"
        );

        let row = materials::get_file(&db, &files[0].id).await.unwrap().unwrap();
        assert_eq!(row.status, MaterialFileStatus::Uploaded);
        assert!(row.file_url.unwrap().ends_with(&files[0].storage_key));
    }

    #[tokio::test]
    async fn failed_upload_removes_earlier_blobs_and_rows() {
        let (db, store, service) = setup().await;
        store.fail_upload_number(2);
        let cancel = CancellationToken::new();
        let err = service
            .upload_material_files(
                None,
                "u1",
                vec![upload("a.txt", b"one"), upload("b.txt", b"two")],
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, NeuroError::ObjectStore { .. }), "got {err:?}");
        assert_eq!(store.len(), 0);
        let sets = materials::list_sets_for_user(&db, "u1", 10).await.unwrap();
        assert!(sets.is_empty());
    }

    #[tokio::test]
    async fn cancelled_upload_is_reported_as_cancelled() {
        let (db, store, service) = setup().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = service
            .upload_material_files(None, "u1", vec![upload("a.txt", b"one")], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, NeuroError::Cancelled));
        assert_eq!(store.len(), 0);
        assert!(materials::list_sets_for_user(&db, "u1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn uploader_rejects_missing_ids() {
        let (db, _, service) = setup().await;
        let tx = db.begin().await.unwrap();
        let err = service
            .uploader
            .upload(&tx, "", "f1", Box::pin(&b""[..]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NeuroError::Internal(_)));
    }

    #[tokio::test]
    async fn sets_are_owner_scoped() {
        let (db, store, service) = setup().await;
        seed_user(&db, "u2").await;
        let cancel = CancellationToken::new();
        let (set, _) = service
            .upload_material_files(None, "u1", vec![upload("a.txt", b"x")], &cancel)
            .await
            .unwrap();

        let other = authenticated("u2");
        let err = service.get_material_set(&other, &set.id).await.unwrap_err();
        assert!(matches!(err, NeuroError::NotFound { .. }));

        let owner = authenticated("u1");
        let (_, files) = service.get_material_set(&owner, &set.id).await.unwrap();
        assert_eq!(files.len(), 1);

        service.delete_material_set(&owner, &set.id).await.unwrap();
        assert_eq!(store.len(), 0);
        assert!(service.list_material_sets(&owner, 10).await.unwrap().is_empty());
    }
}
