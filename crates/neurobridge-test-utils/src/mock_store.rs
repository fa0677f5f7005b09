// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory object store for deterministic testing.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use neurobridge_core::types::{AdapterType, HealthStatus};
use neurobridge_core::{BlobReader, NeuroError, ObjectStore, PluginAdapter};
use tokio::io::AsyncReadExt;

#[derive(Default)]
struct State {
    blobs: HashMap<(String, String), Vec<u8>>,
    uploads: usize,
    fail_on: Option<usize>,
}

/// An [`ObjectStore`] that keeps blobs in a map.
///
/// `fail_upload_number(n)` makes the n-th upload call (1-based, counted
/// from construction) fail after consuming its reader.
#[derive(Default)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_upload_number(&self, n: usize) {
        self.lock().fail_on = Some(n);
    }

    pub fn get(&self, category: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .blobs
            .get(&(category.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of upload calls seen so far, failed ones included.
    pub fn upload_calls(&self) -> usize {
        self.lock().uploads
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PluginAdapter for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory-object-store"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ObjectStore
    }

    async fn health_check(&self) -> Result<HealthStatus, NeuroError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload_file(
        &self,
        category: &str,
        key: &str,
        mut reader: BlobReader,
    ) -> Result<u64, NeuroError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| NeuroError::ObjectStore {
                message: format!("read failed for {key}"),
                source: Some(Box::new(e)),
            })?;

        let mut state = self.lock();
        state.uploads += 1;
        if state.fail_on == Some(state.uploads) {
            return Err(NeuroError::ObjectStore {
                message: format!("injected failure on upload {}", state.uploads),
                source: None,
            });
        }
        let len = bytes.len() as u64;
        state
            .blobs
            .insert((category.to_string(), key.to_string()), bytes);
        Ok(len)
    }

    async fn delete_file(&self, category: &str, key: &str) -> Result<(), NeuroError> {
        self.lock()
            .blobs
            .remove(&(category.to_string(), key.to_string()));
        Ok(())
    }

    fn public_url(&self, category: &str, key: &str) -> String {
        format!("memory://{category}/{key}")
    }
}
