// src/orchestrator/pricing.rs
// Model pricing table for cost estimation and actual-cost accounting.
// Shape grounded directly in the teacher's `llm/pricing.rs::ModelPricing`;
// rates here are placeholders since no upstream pricing table survives the
// distillation into this spec (no original_source/ carried one either).

/// Cost per million tokens for a single model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    const fn new(input: f64, output: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
        }
    }

    /// Estimate or actualize cost for a given token usage.
    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = (input_tokens as f64) * self.input_per_million / 1_000_000.0;
        let output_cost = (output_tokens as f64) * self.output_per_million / 1_000_000.0;
        input_cost + output_cost
    }
}

/// Look up pricing for a model identifier. Unknown models fall back to a
/// conservative default rather than panicking, so cost estimation degrades
/// gracefully instead of blocking a batch.
pub fn get_pricing(model: &str) -> ModelPricing {
    match model {
        "opus" | "claude-opus" => ModelPricing::new(15.00, 75.00),
        "sonnet" | "claude-sonnet" => ModelPricing::new(3.00, 15.00),
        "haiku" | "claude-haiku" => ModelPricing::new(0.80, 4.00),
        _ => DEFAULT_PRICING,
    }
}

const DEFAULT_PRICING: ModelPricing = ModelPricing::new(3.00, 15.00);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opus_pricing_matches_rate_card() {
        let pricing = get_pricing("opus");
        let cost = pricing.calculate_cost(1_000_000, 1_000_000);
        assert!((cost - 90.0).abs() < 0.01);
    }

    #[test]
    fn unknown_model_falls_back_to_default() {
        let pricing = get_pricing("some-future-model");
        assert_eq!(pricing.input_per_million, DEFAULT_PRICING.input_per_million);
    }

    #[test]
    fn small_usage_cost_is_proportional() {
        let pricing = get_pricing("sonnet");
        let cost = pricing.calculate_cost(1_000, 500);
        assert!((cost - (0.003 + 0.0075)).abs() < 0.0001);
    }
}
