//! Per-model pricing and cost computation.
//!
//! Rates are USD per 1k tokens. Locally hosted models cost zero; unknown models
//! cost zero and log a warning so missing table entries are visible in ops.

use tracing::warn;

/// (model, input per 1k, output per 1k). Prefix matches are allowed so dated
/// model ids ("gpt-4o-2024-08-06") pick up their family rate.
const COST_MAPPING: &[(&str, f64, f64)] = &[
    // OpenAI
    ("gpt-4o-mini", 0.000_15, 0.000_6),
    ("gpt-4o", 0.005, 0.015),
    ("gpt-3.5-turbo", 0.000_5, 0.001_5),
    // Bedrock-hosted Anthropic
    ("anthropic.claude-3-sonnet-20240229-v1:0", 0.003, 0.015),
    ("anthropic.claude-3-haiku-20240307-v1:0", 0.000_25, 0.001_25),
    // Local vLLM / Ollama (always zero)
    ("mistral", 0.0, 0.0),
    ("local-gpt-4o-equivalent", 0.0, 0.0),
    ("local-judge-model", 0.0, 0.0),
    ("local-response-model", 0.0, 0.0),
    ("mock-model", 0.0, 0.0),
];

/// Cost of one call in USD. Exact match first, then substring match against the
/// table (longest keys listed first where prefixes overlap), else zero + warning.
pub fn calculate_cost(model_name: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    let rates = COST_MAPPING
        .iter()
        .find(|(name, _, _)| *name == model_name)
        .or_else(|| {
            COST_MAPPING
                .iter()
                .find(|(name, _, _)| model_name.contains(name))
        });

    let Some((_, input_rate, output_rate)) = rates else {
        warn!(model = model_name, "cost mapping not found, recording $0 cost");
        return 0.0;
    };

    let in_cost = (f64::from(prompt_tokens) / 1000.0) * input_rate;
    let out_cost = (f64::from(completion_tokens) / 1000.0) * output_rate;
    in_cost + out_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: exact table entries compute input+output cost per 1k tokens.
    #[test]
    fn known_model_costs() {
        let cost = calculate_cost("gpt-4o", 1000, 1000);
        assert!((cost - 0.020).abs() < 1e-9);
        let cost = calculate_cost("gpt-4o-mini", 2000, 0);
        assert!((cost - 0.000_3).abs() < 1e-9);
    }

    /// **Scenario**: dated model ids match their family by substring; the mini
    /// variant must not be priced as the full model.
    #[test]
    fn substring_match_prefers_exact_family() {
        let full = calculate_cost("gpt-4o-2024-08-06", 1000, 0);
        assert!((full - 0.005).abs() < 1e-9);
        let mini = calculate_cost("gpt-4o-mini-2024-07-18", 1000, 0);
        assert!((mini - 0.000_15).abs() < 1e-9);
    }

    /// **Scenario**: unknown and local models cost zero.
    #[test]
    fn unknown_and_local_models_are_free() {
        assert_eq!(calculate_cost("some-exotic-model", 5000, 5000), 0.0);
        assert_eq!(calculate_cost("mistral:7b-instruct-v0.3-q4_K_M", 5000, 5000), 0.0);
        assert_eq!(calculate_cost("mock-model", 100, 100), 0.0);
    }
}
