//! Token pricing and estimation.
//!
//! Rates are configuration inputs, not constants: a deployment supplies a
//! default rate plus per-model overrides (`[pricing]` in the config file).
//! With no pricing configured every cost is zero, which leaves cost ceilings
//! inert while token ceilings still apply.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Characters per token used by [`estimate_tokens`].
const CHARS_PER_TOKEN: u64 = 4;

/// Price of one thousand input and output tokens, in the caller's currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl TokenPricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Cost of a call with the given token counts.
    pub fn cost(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        (tokens_in as f64 / 1000.0) * self.input_per_1k
            + (tokens_out as f64 / 1000.0) * self.output_per_1k
    }

    pub(crate) fn is_valid(&self) -> bool {
        [self.input_per_1k, self.output_per_1k]
            .iter()
            .all(|rate| rate.is_finite() && *rate >= 0.0)
    }
}

/// Per-model pricing table with a default rate.
///
/// ```rust
/// # use vordr::budget::{CostModel, TokenPricing};
/// let costs = CostModel::new(TokenPricing::new(0.5, 1.5))
///     .with_model("gpt-4", TokenPricing::new(30.0, 60.0));
/// assert_eq!(costs.cost("gpt-4", 1000, 0), 30.0);
/// assert_eq!(costs.cost("unknown", 1000, 0), 0.5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostModel {
    #[serde(default)]
    pub default: TokenPricing,
    #[serde(default)]
    pub models: HashMap<String, TokenPricing>,
}

impl CostModel {
    pub fn new(default: TokenPricing) -> Self {
        Self {
            default,
            models: HashMap::new(),
        }
    }

    /// Add (or replace) the rate for one model.
    pub fn with_model(mut self, model: impl Into<String>, pricing: TokenPricing) -> Self {
        self.models.insert(model.into(), pricing);
        self
    }

    /// Rate for a model, falling back to the default rate.
    pub fn pricing_for(&self, model: &str) -> TokenPricing {
        self.models.get(model).copied().unwrap_or(self.default)
    }

    pub fn cost(&self, model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
        self.pricing_for(model).cost(tokens_in, tokens_out)
    }

    /// Name of the first model (or `"default"`) with a negative or
    /// non-finite rate.
    pub(crate) fn first_invalid(&self) -> Option<&str> {
        if !self.default.is_valid() {
            return Some("default");
        }
        self.models
            .iter()
            .find(|(_, pricing)| !pricing.is_valid())
            .map(|(name, _)| name.as_str())
    }
}

/// Rough token count for text: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}
