// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem-backed [`ObjectStore`] adapter.
//!
//! Blobs live at `{root_dir}/{category}/{key}` and are written through a
//! temporary sibling file that is renamed into place once fully flushed,
//! so a reader never observes a partially written blob.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use neurobridge_config::model::ObjectStoreConfig;
use neurobridge_core::types::{AdapterType, HealthStatus};
use neurobridge_core::{BlobReader, NeuroError, ObjectStore, PluginAdapter};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ObjectStoreConfig) -> Self {
        info!(root = %config.root_dir, "filesystem object store configured");
        Self::new(&config.root_dir, &config.public_base_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `{category}/{key}` under the root, refusing anything that
    /// could escape it.
    pub fn blob_path(&self, category: &str, key: &str) -> Result<PathBuf, NeuroError> {
        let mut path = self.root.clone();
        for part in [category, key] {
            let rel = Path::new(part);
            if part.is_empty()
                || rel
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(NeuroError::Validation(format!(
                    "invalid object path segment: {part:?}"
                )));
            }
            path.push(rel);
        }
        Ok(path)
    }

    fn store_err(message: String, source: std::io::Error) -> NeuroError {
        NeuroError::ObjectStore {
            message,
            source: Some(Box::new(source)),
        }
    }
}

#[async_trait]
impl PluginAdapter for FsObjectStore {
    fn name(&self) -> &str {
        "fs-object-store"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ObjectStore
    }

    async fn health_check(&self) -> Result<HealthStatus, NeuroError> {
        match tokio::fs::create_dir_all(&self.root).await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "root {} not writable: {e}",
                self.root.display()
            ))),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload_file(
        &self,
        category: &str,
        key: &str,
        mut reader: BlobReader,
    ) -> Result<u64, NeuroError> {
        let dest = self.blob_path(category, key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::store_err(format!("create {}", parent.display()), e))?;
        }

        let tmp = dest.with_extension(format!("part-{}", uuid::Uuid::new_v4()));
        let result = async {
            let mut file = tokio::fs::File::create(&tmp)
                .await
                .map_err(|e| Self::store_err(format!("create {}", tmp.display()), e))?;
            let written = tokio::io::copy(&mut reader, &mut file)
                .await
                .map_err(|e| Self::store_err(format!("write {key}"), e))?;
            file.flush()
                .await
                .map_err(|e| Self::store_err(format!("flush {key}"), e))?;
            file.sync_all()
                .await
                .map_err(|e| Self::store_err(format!("sync {key}"), e))?;
            tokio::fs::rename(&tmp, &dest)
                .await
                .map_err(|e| Self::store_err(format!("rename into {key}"), e))?;
            Ok::<_, NeuroError>(written)
        }
        .await;

        match result {
            Ok(written) => {
                debug!(category, key, bytes = written, "blob stored");
                Ok(written)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&tmp).await
                    && cleanup.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %tmp.display(), error = %cleanup, "failed to remove partial blob");
                }
                Err(e)
            }
        }
    }

    async fn delete_file(&self, category: &str, key: &str) -> Result<(), NeuroError> {
        let path = self.blob_path(category, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(category, key, "blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::store_err(format!("delete {key}"), e)),
        }
    }

    fn public_url(&self, category: &str, key: &str) -> String {
        format!("{}/{category}/{key}", self.public_base_url)
    }
}
