// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/neurobridge/neurobridge.toml`
//! 3. `~/.config/neurobridge/neurobridge.toml`
//! 4. `./neurobridge.toml`
//! 5. `NEUROBRIDGE_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::NeuroBridgeConfig;

pub const SYSTEM_CONFIG_FILE: &str = "/etc/neurobridge/neurobridge.toml";
pub const LOCAL_CONFIG_FILE: &str = "neurobridge.toml";
pub const ENV_PREFIX: &str = "NEUROBRIDGE_";

/// Top-level sections, used to turn `NEUROBRIDGE_GAZE_MAX_BATCH` into `gaze.max_batch`.
const SECTIONS: &[&str] = &[
    "server",
    "storage",
    "object_store",
    "auth",
    "gaze",
    "workflow",
    "llm",
];

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("neurobridge").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
pub fn load_config() -> Result<NeuroBridgeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<NeuroBridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NeuroBridgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<NeuroBridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NeuroBridgeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(NeuroBridgeConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_FILE))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Environment provider mapping `section_key` to `section.key`.
///
/// Uses `Env::map()` instead of `Env::split("_")` because keys themselves
/// contain underscores: `NEUROBRIDGE_OBJECT_STORE_PUBLIC_BASE_URL` must land
/// on `object_store.public_base_url`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
            .filter(|r| !r.is_empty())
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
