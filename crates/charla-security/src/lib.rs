// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Privacy utilities: keyed one-way hashing of PII and key-name-based
//! redaction of structured values.

pub mod hash;
pub mod redact;

pub use hash::hash_value;
pub use redact::{redact_value, redacted};
