// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API integration: typed wire format, a retrying HTTP
//! client, pricing, and the completion service used by the webhook handler.

pub mod client;
pub mod pricing;
pub mod service;
pub mod types;

pub use client::AnthropicClient;
pub use pricing::PriceTable;
pub use service::{CompletionMetrics, LlmOptions, LlmService};
