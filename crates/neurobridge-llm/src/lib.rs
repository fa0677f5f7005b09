// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible LLM client used by downstream generation stages.
//!
//! Offers two calls, [`LlmClient::embed`] and [`LlmClient::generate_json`],
//! both wrapped in a bounded retry loop with exponential backoff, jitter
//! and `Retry-After` support.

pub mod client;
pub mod retry;
pub mod types;

pub use client::LlmClient;
pub use retry::RetryPolicy;
