// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the charla service.
//!
//! Hosts the inbound webhook pipeline (content-type gate, signature
//! verifier, dual-axis rate limiter, payload validator) in front of the
//! conversation flow, plus the health probe. Everything hangs off one
//! [`AppContainer`] assembled at startup.

pub mod container;
pub mod content_type;
pub mod health;
pub mod rate_limit;
pub mod server;
pub mod webhook;

pub use container::AppContainer;
pub use server::router;
