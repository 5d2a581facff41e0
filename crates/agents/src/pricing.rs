//! Token pricing.

use serde::{Deserialize, Serialize};

use crate::TokenUsage;

/// Flat per-thousand-token rates used to convert usage into spend.
///
/// Pricing-model accuracy is explicitly out of scope; these rates exist so the
/// cost aggregates have consistent, monotonic inputs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pricing {
    /// USD per 1000 prompt tokens
    pub usd_per_1k_prompt: f64,

    /// USD per 1000 completion tokens
    pub usd_per_1k_completion: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            usd_per_1k_prompt: 0.003,
            usd_per_1k_completion: 0.015,
        }
    }
}

impl Pricing {
    /// Cost of one invocation.
    pub fn cost_usd(&self, usage: TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 / 1000.0) * self.usd_per_1k_prompt
            + (usage.completion_tokens as f64 / 1000.0) * self.usd_per_1k_completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_scales_with_usage() {
        let pricing = Pricing::default();
        let usage = TokenUsage {
            prompt_tokens: 1000,
            completion_tokens: 1000,
        };
        let cost = pricing.cost_usd(usage);
        assert!((cost - 0.018).abs() < 1e-12);
        assert_eq!(pricing.cost_usd(TokenUsage::default()), 0.0);
    }
}
