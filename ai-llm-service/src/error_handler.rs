//! Unified error types and validation helpers for `ai-llm-service`.
//!
//! One root [`AiLlmError`] covers provider calls, health probes, transport
//! failures, and configuration problems, so dependents can hold a single
//! error type regardless of which backend served the request.
//!
//! All messages carry the `[AI LLM Service]` prefix so bubbled-up errors
//! can be attributed to this library in mixed logs.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias for service operations.
pub type Result<T> = std::result::Result<T, AiLlmError>;

/// Root error for every public operation of this crate.
#[derive(Debug, Error)]
pub enum AiLlmError {
    /// Provider-level failure (bad status, undecodable payload, misuse).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Transport failure below the HTTP status level (DNS, connect, TLS,
    /// timeout). Mapped from `reqwest`.
    #[error("[AI LLM Service] transport error: {0}")]
    HttpTransport(#[from] reqwest::Error),

    /// Health probe failure.
    #[error(transparent)]
    Health(#[from] HealthError),

    /// Configuration/environment problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Which backend produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
}

/// Provider error with its origin attached.
#[derive(Debug, Error)]
#[error("[AI LLM Service] {provider:?}: {kind}")]
pub struct ProviderError {
    pub provider: Provider,
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider: Provider, kind: ProviderErrorKind) -> Self {
        Self { provider, kind }
    }
}

/// The concrete failure inside a provider call.
#[derive(Debug, Error)]
pub enum ProviderErrorKind {
    /// The config routed a request to the wrong client.
    #[error("invalid provider for this client")]
    InvalidProvider,

    /// The provider requires an API key and none was configured.
    #[error("missing API key")]
    MissingApiKey,

    /// Endpoint missing or not http(s).
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Non-2xx HTTP status from the backend.
    #[error("unexpected HTTP status {}", .0.status)]
    HttpStatus(HttpError),

    /// Response body could not be decoded into the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Chat completion returned no choices.
    #[error("empty choices in completion response")]
    EmptyChoices,
}

/// Details of a non-success HTTP exchange.
#[derive(Debug)]
pub struct HttpError {
    /// Numeric HTTP status code.
    pub status: StatusCode,
    /// Request URL.
    pub url: String,
    /// Short snippet of the response body.
    pub snippet: String,
}

/// Health probe errors (strict variants behind the resilient facade).
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("[AI LLM Service] health probe HTTP status {}: {}", .0.status, .0.snippet)]
    HttpStatus(HttpError),

    #[error("[AI LLM Service] health probe decode error: {0}")]
    Decode(String),
}

/// Error enum for environment/config-driven setup.
///
/// Keep this focused: only errors that realistically happen at config
/// load/validation time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("[AI LLM Service] missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (ports, limits, timeouts).
    #[error("[AI LLM Service] invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },

    /// Unsupported provider name.
    #[error("[AI LLM Service] unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Value had the wrong format (e.g. invalid URL).
    #[error("[AI LLM Service] invalid format in {var}: {reason}")]
    InvalidFormat {
        var: &'static str,
        reason: &'static str,
    },

    /// Model name was empty.
    #[error("[AI LLM Service] model name must not be empty")]
    EmptyModel,
}

/// Truncate a response body into a log-safe snippet.
pub fn make_snippet(text: &str) -> String {
    text.chars().take(240).collect()
}

/* ------------------------ Env helpers ------------------------ */

/// Fetches a required, non-empty environment variable.
///
/// # Errors
/// Returns [`ConfigError::MissingVar`] if the variable is absent or empty.
pub fn must_env(name: &'static str) -> std::result::Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

/// Parses an optional `u32` from env (`Ok(None)` if unset/empty).
pub fn env_opt_u32(name: &'static str) -> std::result::Result<Option<u32>, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => {
            v.trim()
                .parse::<u32>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidNumber {
                    var: name,
                    reason: "expected u32",
                })
        }
        _ => Ok(None),
    }
}

/// Parses an optional `f32` from env (`Ok(None)` if unset/empty).
pub fn env_opt_f32(name: &'static str) -> std::result::Result<Option<f32>, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => {
            v.trim()
                .parse::<f32>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidNumber {
                    var: name,
                    reason: "expected f32",
                })
        }
        _ => Ok(None),
    }
}

/// Validates that an HTTP endpoint starts with `http://` or `https://`.
pub fn validate_http_endpoint(
    var: &'static str,
    value: &str,
) -> std::result::Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidFormat {
            var,
            reason: "must start with http:// or https://",
        })
    }
}
