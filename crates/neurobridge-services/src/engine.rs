// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow engine adapters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use neurobridge_config::model::WorkflowConfig;
use neurobridge_core::types::{AdapterType, HealthStatus, JobRun};
use neurobridge_core::{Metadata, NeuroError, PluginAdapter, WorkflowEngine};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

/// Body POSTed to the engine for every dispatch.
#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    job_id: &'a str,
    job_type: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    payload: &'a Metadata,
}

/// Dispatches jobs by POSTing them to an HTTP endpoint.
pub struct HttpWorkflowEngine {
    client: reqwest::Client,
    url: String,
    token: Option<SecretString>,
}

impl HttpWorkflowEngine {
    pub fn new(url: &str, token: Option<String>, timeout: Duration) -> Result<Self, NeuroError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NeuroError::Dispatch {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
            token: token.filter(|t| !t.is_empty()).map(SecretString::from),
        })
    }
}

#[async_trait]
impl PluginAdapter for HttpWorkflowEngine {
    fn name(&self) -> &str {
        "http-workflow-engine"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::WorkflowEngine
    }

    async fn health_check(&self) -> Result<HealthStatus, NeuroError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl WorkflowEngine for HttpWorkflowEngine {
    async fn dispatch(&self, job: &JobRun) -> Result<(), NeuroError> {
        let body = DispatchRequest {
            job_id: &job.id,
            job_type: &job.job_type,
            entity_type: &job.entity_type,
            entity_id: &job.entity_id,
            payload: &job.payload,
        };
        let mut request = self
            .client
            .post(&self.url)
            .header("idempotency-key", &job.id)
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| NeuroError::Dispatch {
            message: format!("engine request failed: {e}"),
            source: Some(Box::new(e)),
        })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NeuroError::Dispatch {
                message: format!("engine returned {status}: {text}"),
                source: None,
            });
        }
        debug!(job_id = %job.id, status = %status, "engine accepted job");
        Ok(())
    }
}

/// Logs each dispatch and accepts it. Used when no engine URL is set.
#[derive(Debug, Default)]
pub struct LogOnlyEngine;

#[async_trait]
impl PluginAdapter for LogOnlyEngine {
    fn name(&self) -> &str {
        "log-only-engine"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::WorkflowEngine
    }

    async fn health_check(&self) -> Result<HealthStatus, NeuroError> {
        Ok(HealthStatus::Degraded("no workflow engine configured".into()))
    }
}

#[async_trait]
impl WorkflowEngine for LogOnlyEngine {
    async fn dispatch(&self, job: &JobRun) -> Result<(), NeuroError> {
        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            entity_id = %job.entity_id,
            "no workflow engine configured, job logged only"
        );
        Ok(())
    }
}

/// Pick the engine adapter for the given config.
pub fn engine_from_config(config: &WorkflowConfig) -> Result<Arc<dyn WorkflowEngine>, NeuroError> {
    match config.engine_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => {
            info!(url, "dispatching jobs to HTTP workflow engine");
            Ok(Arc::new(HttpWorkflowEngine::new(
                url,
                config.engine_token.clone(),
                Duration::from_secs(config.dispatch_timeout_secs),
            )?))
        }
        None => Ok(Arc::new(LogOnlyEngine)),
    }
}
