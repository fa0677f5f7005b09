// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible endpoints.
//!
//! Every call goes through [`LlmClient::post_with_retry`], which makes at
//! most `max_retries + 1` attempts.

use std::time::Duration;

use neurobridge_config::model::LlmConfig;
use neurobridge_core::NeuroError;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::retry::{self, RetryPolicy};
use crate::types::{
    ApiErrorResponse, ChatMessage, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    JsonSchemaSpec, ResponseFormat,
};

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    timeout: Duration,
    policy: RetryPolicy,
}

impl LlmClient {
    /// Build a client from config.
    ///
    /// API key resolution: `llm.api_key`, then `OPENAI_API_KEY`, else error.
    pub fn from_config(config: &LlmConfig) -> Result<Self, NeuroError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let client = Self::new(
            &config.base_url,
            &api_key,
            &config.chat_model,
            &config.embedding_model,
            Duration::from_secs(config.timeout_secs),
        )?
        .with_retry_policy(RetryPolicy::default().with_max_retries(config.max_retries));
        info!(
            base_url = %config.base_url,
            chat_model = %config.chat_model,
            "LLM client initialized"
        );
        Ok(client)
    }

    pub fn new(
        base_url: &str,
        api_key: &str,
        chat_model: &str,
        embedding_model: &str,
        timeout: Duration,
    ) -> Result<Self, NeuroError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| NeuroError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| NeuroError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model: chat_model.to_string(),
            embedding_model: embedding_model.to_string(),
            timeout,
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Embed each input, returning vectors in input order.
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, NeuroError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: inputs.to_vec(),
        };
        let mut response: EmbeddingResponse = self.post_with_retry("embeddings", &request).await?;
        if response.data.len() != inputs.len() {
            return Err(NeuroError::Provider {
                message: format!(
                    "embedding count mismatch: sent {}, received {}",
                    inputs.len(),
                    response.data.len()
                ),
                source: None,
            });
        }
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Ask the chat model for a JSON object conforming to `schema`.
    ///
    /// A refusal (explicit `refusal` text or a `content_filter` finish) maps
    /// to [`NeuroError::Refusal`].
    pub async fn generate_json(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, NeuroError> {
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: user.to_string(),
                },
            ],
            response_format: Some(ResponseFormat {
                type_: "json_schema".into(),
                json_schema: JsonSchemaSpec {
                    name: schema_name.to_string(),
                    schema,
                    strict: true,
                },
            }),
        };

        let response: ChatResponse = self.post_with_retry("chat/completions", &request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| NeuroError::Provider {
                message: "response contained no choices".into(),
                source: None,
            })?;

        if let Some(refusal) = choice.message.refusal.filter(|r| !r.trim().is_empty()) {
            return Err(NeuroError::Refusal(refusal));
        }
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(NeuroError::Refusal("content filtered".into()));
        }

        let content = choice.message.content.unwrap_or_default();
        serde_json::from_str(&content).map_err(|e| NeuroError::Provider {
            message: format!("model output for {schema_name} is not valid JSON: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// POST `body` to `{base_url}/{endpoint}` with bounded retries.
    async fn post_with_retry<B, T>(&self, endpoint: &str, body: &B) -> Result<T, NeuroError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{endpoint}", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.policy.max_retries {
            let response = match self.client.post(&url).json(body).send().await {
                Ok(response) => response,
                Err(e) if retry::is_retryable_error(&e) && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt + 1, None);
                    warn!(attempt, endpoint, error = %e, delay_ms = delay.as_millis() as u64, "transport error, will retry");
                    last_error = Some(transport_error(e, self.timeout));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(transport_error(e, self.timeout)),
            };

            let status = response.status();
            debug!(status = %status, attempt, endpoint, "LLM response received");

            if status.is_success() {
                let text = response.text().await.map_err(|e| NeuroError::Provider {
                    message: format!("failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                })?;
                return serde_json::from_str(&text).map_err(|e| NeuroError::Provider {
                    message: format!("failed to parse {endpoint} response: {e}"),
                    source: Some(Box::new(e)),
                });
            }

            let retry_after = retry::parse_retry_after(response.headers());
            let body_text = response.text().await.unwrap_or_default();
            let error = NeuroError::Provider {
                message: describe_error(status, &body_text),
                source: None,
            };

            if retry::is_retryable_status(status) && attempt < self.policy.max_retries {
                let delay = self.policy.delay(attempt + 1, retry_after);
                warn!(status = %status, attempt, endpoint, delay_ms = delay.as_millis() as u64, "transient error, will retry");
                last_error = Some(error);
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(error);
        }

        Err(last_error.unwrap_or_else(|| NeuroError::Provider {
            message: format!("{endpoint} request failed after retries"),
            source: None,
        }))
    }
}

fn resolve_api_key(configured: Option<&str>) -> Result<String, NeuroError> {
    if let Some(key) = configured.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            NeuroError::Config("llm.api_key is not set and OPENAI_API_KEY is empty".into())
        })
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> NeuroError {
    if e.is_timeout() {
        NeuroError::Timeout { duration: timeout }
    } else {
        NeuroError::Provider {
            message: format!("HTTP request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api) => format!(
            "LLM API error ({}, {}): {}",
            status,
            api.error.type_.as_deref().unwrap_or("unknown"),
            api.error.message
        ),
        Err(_) => format!("LLM API returned {status}: {body}"),
    }
}
