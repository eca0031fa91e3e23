// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model pricing and per-call cost calculation.
//!
//! Claude Haiku:  input=$0.80/MTok, output=$4.00/MTok
//! Claude Sonnet: input=$3.00/MTok, output=$15.00/MTok
//! Claude Opus:   input=$15.00/MTok, output=$75.00/MTok

/// Per-model pricing in USD per million tokens.
#[derive(Debug, Clone, Copy)]
pub struct PriceTable {
    /// Cost per million input tokens.
    pub input_per_mtok: f64,
    /// Cost per million output tokens.
    pub output_per_mtok: f64,
}

impl Default for PriceTable {
    /// Sonnet pricing, the workspace default model tier.
    fn default() -> Self {
        Self {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
        }
    }
}

impl PriceTable {
    /// Look up pricing for a model identifier.
    ///
    /// Matches on substrings: "opus", "haiku", "sonnet". Falls back to
    /// Sonnet pricing for unknown models so cost tracking never silently
    /// drops records.
    pub fn for_model(model: &str) -> Self {
        let lower = model.to_lowercase();
        if lower.contains("opus") {
            Self {
                input_per_mtok: 15.0,
                output_per_mtok: 75.0,
            }
        } else if lower.contains("haiku") {
            Self {
                input_per_mtok: 0.80,
                output_per_mtok: 4.0,
            }
        } else {
            Self::default()
        }
    }

    /// Cost in USD of one call.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (f64::from(input_tokens) / 1_000_000.0) * self.input_per_mtok
            + (f64::from(output_tokens) / 1_000_000.0) * self.output_per_mtok
    }
}
