// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The full service graph, wired once and shared by the HTTP gateway, the
//! CLI and the test harness.

use std::sync::Arc;
use std::time::Duration;

use neurobridge_config::model::NeuroBridgeConfig;
use neurobridge_core::{NeuroError, ObjectStore, WorkflowEngine};
use neurobridge_storage::Database;

use crate::{
    AuthService, ChatWriter, GazeService, JobLedger, LearningBuildOrchestrator, MaterialService,
    PathBootstrap,
};

#[derive(Clone)]
pub struct Services {
    pub db: Database,
    pub auth: AuthService,
    pub materials: MaterialService,
    pub paths: PathBootstrap,
    pub chat: ChatWriter,
    pub jobs: JobLedger,
    pub orchestrator: LearningBuildOrchestrator,
    pub gaze: Arc<GazeService>,
}

impl Services {
    /// Wire every service over `db` and the given adapters.
    ///
    /// Fails when `auth.jwt_secret` is missing.
    pub fn build(
        db: Database,
        store: Arc<dyn ObjectStore>,
        engine: Arc<dyn WorkflowEngine>,
        config: &NeuroBridgeConfig,
    ) -> Result<Self, NeuroError> {
        let auth = AuthService::from_config(db.clone(), &config.auth)?;
        let materials = MaterialService::new(db.clone(), store);
        let paths = PathBootstrap::new(db.clone());
        let chat = ChatWriter::new(db.clone());
        let jobs = JobLedger::new(
            db.clone(),
            engine,
            Duration::from_secs(config.workflow.dispatch_timeout_secs),
        );
        let orchestrator = LearningBuildOrchestrator::new(
            db.clone(),
            materials.clone(),
            paths.clone(),
            chat.clone(),
            jobs.clone(),
        );
        let gaze = Arc::new(GazeService::new(db.clone(), config.gaze.clone()));
        Ok(Self {
            db,
            auth,
            materials,
            paths,
            chat,
            jobs,
            orchestrator,
            gaze,
        })
    }
}
