// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the core and its external collaborators.

pub mod kv;

pub use kv::KeyValueStore;
