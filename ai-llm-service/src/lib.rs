//! Shared LLM service with providers (Ollama / OpenAI-compatible),
//! unified errors, health checks, token-usage accounting, and three
//! cached role profiles: planner, synthesis, embedding.
//!
//! Construct [`LlmServiceProfiles`] once (usually from env via
//! [`config::default_config`]), wrap it in `Arc`, and hand clones to the
//! pipeline. All provider traffic shares one process-wide concurrency
//! semaphore.

pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod service_profiles;
pub mod services;

pub use config::{LlmModelConfig, LlmProvider};
pub use error_handler::AiLlmError;
pub use health_service::HealthStatus;
pub use service_profiles::LlmServiceProfiles;
pub use services::Generation;
