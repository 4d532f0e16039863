//! Configuration types and env-driven constructors.

pub mod default_config;
pub mod llm_model_config;
pub mod llm_provider;

pub use llm_model_config::LlmModelConfig;
pub use llm_provider::LlmProvider;
