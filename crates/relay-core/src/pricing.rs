//! Model pricing tables and cost calculation.
//!
//! Prices are USD per million tokens. Cache writes are billed at 1.25x the
//! input rate and cache reads at 0.1x.

use crate::events::Usage;

/// Per-model pricing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricingTier {
    /// Input price per million tokens.
    pub input_per_million: f64,
    /// Output price per million tokens.
    pub output_per_million: f64,
    /// Cache write multiplier over the input price.
    pub cache_write_multiplier: f64,
    /// Cache read multiplier over the input price.
    pub cache_read_multiplier: f64,
}

fn anthropic_tier(input: f64, output: f64) -> PricingTier {
    PricingTier {
        input_per_million: input,
        output_per_million: output,
        cache_write_multiplier: 1.25,
        cache_read_multiplier: 0.1,
    }
}

/// Look up the pricing tier for a model identifier.
///
/// Matches by model family substring and falls back to Sonnet pricing.
#[must_use]
pub fn get_pricing_tier(model: &str) -> PricingTier {
    let model = model.to_ascii_lowercase();
    if model.contains("opus-4-5") || model.contains("opus-4-6") {
        anthropic_tier(5.0, 25.0)
    } else if model.contains("opus") {
        anthropic_tier(15.0, 75.0)
    } else if model.contains("haiku-4") {
        anthropic_tier(1.0, 5.0)
    } else if model.contains("3-5-haiku") || model.contains("haiku-3-5") {
        anthropic_tier(0.8, 4.0)
    } else if model.contains("haiku") {
        anthropic_tier(0.25, 1.25)
    } else {
        anthropic_tier(3.0, 15.0)
    }
}

/// Calculate the USD cost of `usage` on `model`.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Token counts never approach 2^52
pub fn calculate_cost(model: &str, usage: &Usage) -> f64 {
    let tier = get_pricing_tier(model);
    let per_token = |n: u64, rate: f64| n as f64 / 1_000_000.0 * rate;

    let base_input = usage
        .input_tokens
        .saturating_sub(usage.cache_read_tokens)
        .saturating_sub(usage.cache_creation_tokens);

    let input_cost = per_token(base_input, tier.input_per_million)
        + per_token(usage.cache_creation_tokens, tier.input_per_million)
            * tier.cache_write_multiplier
        + per_token(usage.cache_read_tokens, tier.input_per_million) * tier.cache_read_multiplier;
    let output_cost = per_token(usage.output_tokens, tier.output_per_million);

    input_cost + output_cost
}
