//! Cost calculation for LLM providers.
//!
//! Provides a hardcoded default pricing table for known models with user
//! override capability from `config.toml`. Lookup is an exact
//! (provider, model) match; unknown pairs have no price, never zero.
//! Cost displays are labeled as approximate (`~$0.12`).

use std::collections::HashMap;

use parley_types::config::PricingOverride;

/// USD per 1K input and output tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// Internal pricing entry for the hardcoded default table.
struct PricingEntry {
    provider: &'static str,
    model: &'static str,
    input_per_1k: f64,
    output_per_1k: f64,
}

/// Return the hardcoded default pricing table for known providers/models.
///
/// Prices are approximate list prices in USD per 1K tokens.
fn default_pricing_table() -> Vec<PricingEntry> {
    vec![
        // OpenAI
        PricingEntry { provider: "openai", model: "gpt-4", input_per_1k: 0.03, output_per_1k: 0.06 },
        PricingEntry { provider: "openai", model: "gpt-4-turbo", input_per_1k: 0.01, output_per_1k: 0.03 },
        PricingEntry { provider: "openai", model: "gpt-4o", input_per_1k: 0.0025, output_per_1k: 0.01 },
        PricingEntry { provider: "openai", model: "gpt-4o-mini", input_per_1k: 0.00015, output_per_1k: 0.0006 },
        PricingEntry { provider: "openai", model: "gpt-3.5-turbo", input_per_1k: 0.0005, output_per_1k: 0.0015 },
        PricingEntry { provider: "openai", model: "o1", input_per_1k: 0.015, output_per_1k: 0.06 },
        PricingEntry { provider: "openai", model: "o1-mini", input_per_1k: 0.003, output_per_1k: 0.012 },
        // Anthropic
        PricingEntry { provider: "anthropic", model: "claude-3-5-sonnet-20241022", input_per_1k: 0.003, output_per_1k: 0.015 },
        PricingEntry { provider: "anthropic", model: "claude-3-5-haiku-20241022", input_per_1k: 0.0008, output_per_1k: 0.004 },
        PricingEntry { provider: "anthropic", model: "claude-3-opus-20240229", input_per_1k: 0.015, output_per_1k: 0.075 },
        PricingEntry { provider: "anthropic", model: "claude-3-haiku-20240307", input_per_1k: 0.00025, output_per_1k: 0.00125 },
        PricingEntry { provider: "anthropic", model: "claude-sonnet-4-20250514", input_per_1k: 0.003, output_per_1k: 0.015 },
        PricingEntry { provider: "anthropic", model: "claude-opus-4-20250514", input_per_1k: 0.015, output_per_1k: 0.075 },
        // Google
        PricingEntry { provider: "google", model: "gemini-1.5-pro", input_per_1k: 0.00125, output_per_1k: 0.005 },
        PricingEntry { provider: "google", model: "gemini-1.5-flash", input_per_1k: 0.000075, output_per_1k: 0.0003 },
        PricingEntry { provider: "google", model: "gemini-2.0-flash", input_per_1k: 0.0001, output_per_1k: 0.0004 },
        // Groq
        PricingEntry { provider: "groq", model: "llama-3.3-70b-versatile", input_per_1k: 0.00059, output_per_1k: 0.00079 },
        PricingEntry { provider: "groq", model: "llama-3.1-8b-instant", input_per_1k: 0.00005, output_per_1k: 0.00008 },
        PricingEntry { provider: "groq", model: "mixtral-8x7b-32768", input_per_1k: 0.00024, output_per_1k: 0.00024 },
        // xAI
        PricingEntry { provider: "xai", model: "grok-2-1212", input_per_1k: 0.002, output_per_1k: 0.01 },
        PricingEntry { provider: "xai", model: "grok-beta", input_per_1k: 0.005, output_per_1k: 0.015 },
        // Hosted open-weight models
        PricingEntry { provider: "deepinfra", model: "meta-llama/Meta-Llama-3.1-70B-Instruct", input_per_1k: 0.00035, output_per_1k: 0.0004 },
        PricingEntry { provider: "together", model: "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo", input_per_1k: 0.00018, output_per_1k: 0.00018 },
        PricingEntry { provider: "fireworks", model: "accounts/fireworks/models/llama-v3p1-70b-instruct", input_per_1k: 0.0009, output_per_1k: 0.0009 },
    ]
}

/// Price table with user overrides layered on top of the defaults.
#[derive(Debug, Clone)]
pub struct PricingManager {
    prices: HashMap<(String, String), ModelPrice>,
}

impl PricingManager {
    /// Build the table: defaults first, then `overrides` replacing or adding entries.
    pub fn new(overrides: &[PricingOverride]) -> Self {
        let mut prices: HashMap<(String, String), ModelPrice> = default_pricing_table()
            .into_iter()
            .map(|e| {
                (
                    (e.provider.to_string(), e.model.to_string()),
                    ModelPrice {
                        input_per_1k: e.input_per_1k,
                        output_per_1k: e.output_per_1k,
                    },
                )
            })
            .collect();

        for o in overrides {
            prices.insert(
                (o.provider.clone(), o.model.clone()),
                ModelPrice {
                    input_per_1k: o.input_per_1k,
                    output_per_1k: o.output_per_1k,
                },
            );
        }

        Self { prices }
    }

    pub fn price(&self, provider: &str, model: &str) -> Option<ModelPrice> {
        self.prices
            .get(&(provider.to_string(), model.to_string()))
            .copied()
    }

    /// Cost in USD, or `None` when the pair has no price.
    pub fn calculate_cost(
        &self,
        provider: &str,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Option<f64> {
        self.price(provider, model)
            .map(|price| compute_cost(prompt_tokens, completion_tokens, price))
    }
}

impl Default for PricingManager {
    fn default() -> Self {
        Self::new(&[])
    }
}

/// Compute cost in USD given token counts and per-1K rates.
fn compute_cost(prompt_tokens: u32, completion_tokens: u32, price: ModelPrice) -> f64 {
    let input_cost = (prompt_tokens as f64 / 1_000.0) * price.input_per_1k;
    let output_cost = (completion_tokens as f64 / 1_000.0) * price.output_per_1k;
    input_cost + output_cost
}

/// Format a cost estimate as a human-readable string.
///
/// Always prefixed with `~` to indicate the value is an estimate.
/// - Costs below $0.01 use 3 decimal places: `~$0.001`
/// - Costs $0.01 and above use 2 decimal places: `~$0.12`
pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("~${cost:.3}")
    } else {
        format!("~${cost:.2}")
    }
}
