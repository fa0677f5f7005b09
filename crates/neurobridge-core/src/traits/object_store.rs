// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Object storage adapter trait.

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::NeuroError;
use crate::traits::adapter::PluginAdapter;

/// A byte stream handed to [`ObjectStore::upload_file`].
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Blob storage keyed by `(category, key)`.
///
/// Implementations must be safe to share across request tasks.
#[async_trait]
pub trait ObjectStore: PluginAdapter {
    /// Streams `reader` to storage under `key`, returning the bytes written.
    async fn upload_file(
        &self,
        category: &str,
        key: &str,
        reader: BlobReader,
    ) -> Result<u64, NeuroError>;

    /// Deletes the blob under `key`. Missing blobs are not an error.
    async fn delete_file(&self, category: &str, key: &str) -> Result<(), NeuroError>;

    /// Public URL for the blob under `key`.
    fn public_url(&self, category: &str, key: &str) -> String;
}
