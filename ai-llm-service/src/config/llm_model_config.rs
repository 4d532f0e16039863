use crate::config::llm_provider::LlmProvider;
use crate::error_handler::ConfigError;

/// Configuration for one LLM model invocation target.
///
/// Covers both general knobs (model, endpoint, timeout) and the pricing
/// hint used by callers that enforce a monetary budget.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// The LLM provider/backend.
    pub provider: LlmProvider,

    /// Model identifier string (e.g. `"qwen2.5-coder:7b-instruct"`).
    pub model: String,

    /// Inference endpoint base URL.
    pub endpoint: String,

    /// Optional API key for providers that require authentication.
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature. Risk assessments want deterministic-ish
    /// output; keep this at or below 0.3.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Combined price per 1000 tokens, in cents. Used by budget-enforcing
    /// callers to translate token usage into spend; `None` means free
    /// (local models).
    pub price_per_1k_tokens_cents: Option<f32>,
}

impl LlmModelConfig {
    /// Basic sanity validation.
    ///
    /// # Errors
    /// - [`ConfigError::EmptyModel`] when the model id is blank.
    /// - [`ConfigError::InvalidFormat`] when the endpoint is not http(s).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        crate::error_handler::validate_http_endpoint("endpoint", &self.endpoint)
    }

    /// Cents spent for the given token usage under this config's pricing.
    pub fn cost_cents(&self, total_tokens: u64) -> f32 {
        match self.price_per_1k_tokens_cents {
            Some(price) => (total_tokens as f32 / 1000.0) * price,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: "test-model".into(),
            endpoint: "http://localhost:11434".into(),
            api_key: None,
            max_tokens: Some(512),
            temperature: Some(0.2),
            top_p: None,
            timeout_secs: Some(10),
            price_per_1k_tokens_cents: Some(0.5),
        }
    }

    #[test]
    fn validate_rejects_empty_model_and_bad_endpoint() {
        let mut c = cfg();
        c.model = "  ".into();
        assert!(c.validate().is_err());

        let mut c = cfg();
        c.endpoint = "localhost:11434".into();
        assert!(c.validate().is_err());

        assert!(cfg().validate().is_ok());
    }

    #[test]
    fn cost_scales_with_tokens() {
        let c = cfg();
        assert!((c.cost_cents(2000) - 1.0).abs() < 1e-6);
        let mut free = cfg();
        free.price_per_1k_tokens_cents = None;
        assert_eq!(free.cost_cents(1_000_000), 0.0);
    }
}
