// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every problem rather than failing on the first one.

use crate::diagnostic::ConfigError;
use crate::model::NeuroBridgeConfig;

/// Shortest accepted HS256 secret.
pub const MIN_JWT_SECRET_LEN: usize = 32;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &NeuroBridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let host = config.server.host.trim();
    if host.is_empty() {
        fail("server.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if !LOG_LEVELS.contains(&config.server.log_level.as_str()) {
        fail(format!(
            "server.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.server.log_level
        ));
    }

    if config.server.max_upload_bytes == 0 {
        fail("server.max_upload_bytes must be greater than 0".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.object_store.root_dir.trim().is_empty() {
        fail("object_store.root_dir must not be empty".to_string());
    }

    if !is_http_url(&config.object_store.public_base_url) {
        fail(format!(
            "object_store.public_base_url `{}` must start with http:// or https://",
            config.object_store.public_base_url
        ));
    }

    if let Some(secret) = &config.auth.jwt_secret
        && secret.len() < MIN_JWT_SECRET_LEN
    {
        fail(format!(
            "auth.jwt_secret must be at least {MIN_JWT_SECRET_LEN} bytes, got {}",
            secret.len()
        ));
    }

    if config.auth.access_ttl_secs == 0 {
        fail("auth.access_ttl_secs must be greater than 0".to_string());
    }

    if config.auth.refresh_ttl_secs <= config.auth.access_ttl_secs {
        fail(format!(
            "auth.refresh_ttl_secs ({}) must exceed auth.access_ttl_secs ({})",
            config.auth.refresh_ttl_secs, config.auth.access_ttl_secs
        ));
    }

    if config.gaze.min_confidence_pct > 100 {
        fail(format!(
            "gaze.min_confidence_pct must be within 0..=100, got {}",
            config.gaze.min_confidence_pct
        ));
    }

    if config.gaze.max_batch == 0 {
        fail("gaze.max_batch must be greater than 0".to_string());
    }

    if config.gaze.max_points_per_sec == 0 {
        fail("gaze.max_points_per_sec must be greater than 0".to_string());
    }

    if config.gaze.retention_days == 0 {
        fail("gaze.retention_days must be greater than 0".to_string());
    }

    if let Some(url) = &config.workflow.engine_url
        && !is_http_url(url)
    {
        fail(format!(
            "workflow.engine_url `{url}` must start with http:// or https://"
        ));
    }

    if config.workflow.dispatch_timeout_secs == 0 {
        fail("workflow.dispatch_timeout_secs must be greater than 0".to_string());
    }

    // A dispatch still in flight must never look stale to the reconciler.
    if config.workflow.dispatch_timeout_secs >= config.workflow.reconcile_stale_secs {
        fail(format!(
            "workflow.reconcile_stale_secs ({}) must exceed workflow.dispatch_timeout_secs ({})",
            config.workflow.reconcile_stale_secs, config.workflow.dispatch_timeout_secs
        ));
    }

    if !is_http_url(&config.llm.base_url) {
        fail(format!(
            "llm.base_url `{}` must start with http:// or https://",
            config.llm.base_url
        ));
    }

    if config.llm.timeout_secs == 0 {
        fail("llm.timeout_secs must be greater than 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
