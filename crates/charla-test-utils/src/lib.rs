// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test utilities: the end-to-end gateway harness.

pub mod harness;

pub use harness::{
    body_string, completion_body, GatewayHarness, GatewayHarnessBuilder, TEST_AUTH_TOKEN,
    TEST_HOST, WEBHOOK_PATH,
};
