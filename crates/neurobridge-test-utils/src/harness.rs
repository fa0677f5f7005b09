// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` opens a migrated SQLite database in a temp directory and
//! wires the full [`Services`] graph to a [`MemoryObjectStore`] and a
//! [`MockWorkflowEngine`] that reads jobs back from the same database.

use std::sync::Arc;
use std::time::Duration;

use neurobridge_config::model::{GazeConfig, NeuroBridgeConfig};
use neurobridge_core::types::User;
use neurobridge_core::{NeuroError, RequestContext};
use neurobridge_services::{Services, TokenPair};
use neurobridge_storage::Database;

use crate::mock_engine::MockWorkflowEngine;
use crate::mock_store::MemoryObjectStore;

/// Signing secret used by every harness.
pub const TEST_JWT_SECRET: &str = "neurobridge-test-secret-0123456789abcdef";

/// Password used by [`TestHarness::register`].
pub const TEST_PASSWORD: &str = "correct horse battery";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: NeuroBridgeConfig,
    engine_delay: Option<Duration>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = NeuroBridgeConfig::default();
        config.auth.jwt_secret = Some(TEST_JWT_SECRET.to_string());
        Self {
            config,
            engine_delay: None,
        }
    }

    pub fn with_gaze_config(mut self, gaze: GazeConfig) -> Self {
        self.config.gaze = gaze;
        self
    }

    /// Stall every engine call, e.g. to exercise the dispatch timeout.
    pub fn with_engine_delay(mut self, delay: Duration) -> Self {
        self.engine_delay = Some(delay);
        self
    }

    pub fn with_dispatch_timeout(mut self, secs: u64) -> Self {
        self.config.workflow.dispatch_timeout_secs = secs;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, NeuroError> {
        let temp_dir = tempfile::TempDir::new().map_err(NeuroError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        let mut config = self.config;
        config.storage.database_path = db_path.to_string_lossy().to_string();

        let db = Database::open_with(&config.storage).await?;
        let store = Arc::new(MemoryObjectStore::new());
        let mut engine = MockWorkflowEngine::new().with_database(db.clone());
        if let Some(delay) = self.engine_delay {
            engine = engine.with_delay(delay);
        }
        let engine = Arc::new(engine);
        let services = Services::build(db.clone(), store.clone(), engine.clone(), &config)?;

        Ok(TestHarness {
            db,
            store,
            engine,
            services,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// Database handle (temp file, removed on drop).
    pub db: Database,
    pub store: Arc<MemoryObjectStore>,
    pub engine: Arc<MockWorkflowEngine>,
    pub services: Services,
    pub config: NeuroBridgeConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Register `email` with [`TEST_PASSWORD`] and return the user, its
    /// tokens and a context resolved from the access token.
    pub async fn register(
        &self,
        email: &str,
    ) -> Result<(User, TokenPair, RequestContext), NeuroError> {
        let (user, tokens) = self
            .services
            .auth
            .register(email, TEST_PASSWORD, "Test", "User")
            .await?;
        let ctx = self
            .services
            .auth
            .context_from_token(Some(&tokens.access_token))
            .await?;
        Ok((user, tokens, ctx))
    }
}
