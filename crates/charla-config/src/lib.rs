// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration for the charla gateway.
//!
//! TOML file plus environment overrides (both `CHARLA_*` prefixed keys and
//! the conventional un-prefixed operational variables), deserialized into
//! typed sections with post-deserialization validation.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{CharlaConfig, Environment};
pub use validation::{ensure_valid, validate_config};
