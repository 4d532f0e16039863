//! Default LLM configs loaded strictly from environment variables.
//!
//! Convenience constructors for [`LlmModelConfig`], grouped by role:
//!
//! - **Planner**   → fast model driving hop-by-hop investigation turns
//! - **Synthesis** → higher-quality model for the final summary call
//! - **Embedding** → embedding generator (incident similarity search)
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND`        = provider kind (`ollama` | `openai`)
//! - `LLM_MAX_TOKENS`  = optional per-call generation cap (u32)
//! - `LLM_PRICE_PER_1K_CENTS` = optional pricing hint for cost budgets
//!
//! Ollama-specific:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//!
//! OpenAI-specific:
//! - `OPENAI_URL` (default `https://api.openai.com`), `OPENAI_API_KEY`
//!
//! Role models:
//! - `PLANNER_MODEL` (mandatory), `SYNTH_MODEL` (optional, falls back to
//!   planner), `EMBEDDING_MODEL` (optional)

use std::str::FromStr;

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, ConfigError, env_opt_f32, env_opt_u32, must_env},
};

/// Resolve the provider kind from `LLM_KIND` (default: ollama).
fn provider_kind() -> Result<LlmProvider, AiLlmError> {
    match std::env::var("LLM_KIND") {
        Ok(v) if !v.trim().is_empty() => Ok(LlmProvider::from_str(&v)?),
        _ => Ok(LlmProvider::Ollama),
    }
}

/// Resolve the endpoint for the chosen provider.
///
/// Ollama precedence: `OLLAMA_URL`, then `OLLAMA_PORT` →
/// `http://localhost:{port}`. OpenAI: `OPENAI_URL` with a hosted default.
fn endpoint_for(provider: LlmProvider) -> Result<String, AiLlmError> {
    match provider {
        LlmProvider::Ollama => {
            if let Ok(url) = std::env::var("OLLAMA_URL") {
                if !url.trim().is_empty() {
                    return Ok(url);
                }
            }
            if let Ok(port) = std::env::var("OLLAMA_PORT") {
                if !port.trim().is_empty() {
                    port.trim()
                        .parse::<u16>()
                        .map_err(|_| ConfigError::InvalidNumber {
                            var: "OLLAMA_PORT",
                            reason: "expected u16 (1..=65535)",
                        })?;
                    return Ok(format!("http://localhost:{}", port.trim()));
                }
            }
            Err(AiLlmError::Config(ConfigError::MissingVar(
                "OLLAMA_URL or OLLAMA_PORT",
            )))
        }
        LlmProvider::OpenAi => Ok(std::env::var("OPENAI_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "https://api.openai.com".to_string())),
    }
}

fn api_key_for(provider: LlmProvider) -> Result<Option<String>, AiLlmError> {
    match provider {
        LlmProvider::Ollama => Ok(None),
        LlmProvider::OpenAi => Ok(Some(must_env("OPENAI_API_KEY")?)),
    }
}

fn base_config(model: String, temperature: f32) -> Result<LlmModelConfig, AiLlmError> {
    let provider = provider_kind()?;
    let cfg = LlmModelConfig {
        provider,
        model,
        endpoint: endpoint_for(provider)?,
        api_key: api_key_for(provider)?,
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: Some(temperature),
        top_p: None,
        timeout_secs: Some(10),
        price_per_1k_tokens_cents: env_opt_f32("LLM_PRICE_PER_1K_CENTS")?,
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Config for the **planner** role (hop turns; low temperature).
///
/// # Env
/// - `PLANNER_MODEL` (required)
pub fn config_planner() -> Result<LlmModelConfig, AiLlmError> {
    base_config(must_env("PLANNER_MODEL")?, 0.1)
}

/// Config for the **synthesis** role (final summary; slightly warmer, with
/// a longer timeout). Falls back to the planner model when `SYNTH_MODEL`
/// is unset.
pub fn config_synthesis() -> Result<LlmModelConfig, AiLlmError> {
    let model = std::env::var("SYNTH_MODEL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map_or_else(|| must_env("PLANNER_MODEL"), Ok)?;
    let mut cfg = base_config(model, 0.3)?;
    cfg.timeout_secs = Some(15);
    Ok(cfg)
}

/// Config for the **embedding** role.
///
/// # Env
/// - `EMBEDDING_MODEL` (required; callers treat its absence as "no
///   embedding search available" rather than a fatal error)
pub fn config_embedding() -> Result<LlmModelConfig, AiLlmError> {
    let mut cfg = base_config(must_env("EMBEDDING_MODEL")?, 0.0)?;
    cfg.max_tokens = None;
    Ok(cfg)
}
