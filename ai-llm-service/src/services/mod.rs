//! Provider clients.

pub mod ollama_service;
pub mod open_ai_service;

use serde::{Deserialize, Serialize};

/// Result of one generation call, with provider-reported token usage.
///
/// Token counts come straight from the backend (`prompt_eval_count` /
/// `eval_count` for Ollama, `usage` for OpenAI-compatible APIs). A backend
/// that omits them yields zeros; budget-enforcing callers should treat a
/// zero total as "usage unknown" and fall back to a length estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text.
    pub text: String,
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    pub completion_tokens: u32,
}

impl Generation {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Rough token estimate for budget accounting when the provider did
    /// not report usage (~4 chars per token).
    pub fn estimated_total_tokens(&self, prompt_len_chars: usize) -> u32 {
        if self.total_tokens() > 0 {
            self.total_tokens()
        } else {
            ((prompt_len_chars + self.text.len()) / 4) as u32
        }
    }
}
