// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `NEUROBRIDGE_*` environment overrides. These mutate process env, so
//! every test here is serialized.

use neurobridge_config::load_config_from_path;
use serial_test::serial;

struct EnvGuard(&'static [&'static str]);

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in self.0 {
            // SAFETY: tests in this file are serialized and spawn no threads.
            unsafe { std::env::remove_var(key) };
        }
    }
}

fn set(key: &str, value: &str) {
    // SAFETY: see EnvGuard.
    unsafe { std::env::set_var(key, value) };
}

#[test]
#[serial]
fn env_beats_file_for_underscored_keys() {
    let _guard = EnvGuard(&[
        "NEUROBRIDGE_GAZE_MAX_BATCH",
        "NEUROBRIDGE_OBJECT_STORE_PUBLIC_BASE_URL",
    ]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("neurobridge.toml");
    std::fs::write(&path, "[gaze]\nmax_batch = 100\n").unwrap();

    set("NEUROBRIDGE_GAZE_MAX_BATCH", "77");
    set("NEUROBRIDGE_OBJECT_STORE_PUBLIC_BASE_URL", "https://cdn.test/blobs");

    let config = load_config_from_path(&path).unwrap();
    assert_eq!(config.gaze.max_batch, 77);
    assert_eq!(config.object_store.public_base_url, "https://cdn.test/blobs");
}

#[test]
#[serial]
fn secret_can_come_from_env_alone() {
    let _guard = EnvGuard(&["NEUROBRIDGE_AUTH_JWT_SECRET"]);
    set("NEUROBRIDGE_AUTH_JWT_SECRET", "env-secret-0123456789abcdef0123456789");

    let config = load_config_from_path(std::path::Path::new("/nonexistent/neurobridge.toml"))
        .unwrap();
    assert_eq!(
        config.auth.jwt_secret.as_deref(),
        Some("env-secret-0123456789abcdef0123456789")
    );
}
