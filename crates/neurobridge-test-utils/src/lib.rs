// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for NeuroBridge integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without a real blob store or workflow engine.
//!
//! # Components
//!
//! - [`MemoryObjectStore`] - In-memory blob store with failure injection
//! - [`MockWorkflowEngine`] - Recording workflow engine with failure and delay injection
//! - [`TestHarness`] - Temp database plus every service wired to the mocks

pub mod fixtures;
pub mod harness;
pub mod mock_engine;
pub mod mock_store;

pub use fixtures::{authenticated, seed_user};
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_engine::MockWorkflowEngine;
pub use mock_store::MemoryObjectStore;
