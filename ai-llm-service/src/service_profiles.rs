//! Shared LLM service with three roles: **planner**, **synthesis**, and
//! **embedding**.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Caches underlying HTTP clients per config (endpoint+model+key+timeout).
//! - Every generation/embedding call passes through one shared semaphore,
//!   capping concurrent in-flight provider requests process-wide (provider
//!   rate limits apply to the process, not to a single caller).
//! - If the synthesis profile is not provided, it falls back to planner.
//! - The embedding profile is optional; `embed` reports a config error
//!   when absent so callers can degrade to text-only search.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::Arc,
};

use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info};

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, ConfigError},
    health_service::{HealthService, HealthStatus},
    services::{Generation, ollama_service::OllamaService, open_ai_service::OpenAiService},
};

/// Default process-wide cap on concurrent provider calls.
pub const DEFAULT_LLM_CONCURRENCY: usize = 4;

/// Shared service that manages the planner / synthesis / embedding roles.
#[derive(Debug)]
pub struct LlmServiceProfiles {
    planner: LlmModelConfig,
    synthesis: LlmModelConfig,
    embedding: Option<LlmModelConfig>,

    ollama: RwLock<HashMap<ClientKey, Arc<OllamaService>>>,
    openai: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,

    limiter: Arc<Semaphore>,
    health: HealthService,
}

impl LlmServiceProfiles {
    /// Creates a new service.
    ///
    /// - `planner`: required profile driving investigation turns.
    /// - `synthesis_opt`: optional profile for final summaries; falls back
    ///   to `planner`.
    /// - `embedding_opt`: optional embedding profile.
    /// - `concurrency`: cap on concurrent provider calls (0 → default 4).
    /// - `health_timeout_secs`: optional timeout for the health checker.
    pub fn new(
        planner: LlmModelConfig,
        synthesis_opt: Option<LlmModelConfig>,
        embedding_opt: Option<LlmModelConfig>,
        concurrency: usize,
        health_timeout_secs: Option<u64>,
    ) -> Result<Self, AiLlmError> {
        let synthesis = synthesis_opt.unwrap_or_else(|| planner.clone());
        let permits = if concurrency == 0 {
            DEFAULT_LLM_CONCURRENCY
        } else {
            concurrency
        };

        info!(
            planner.provider = %planner.provider,
            planner.model = %planner.model,
            synthesis.provider = %synthesis.provider,
            synthesis.model = %synthesis.model,
            embedding.model = embedding_opt.as_ref().map(|e| e.model.as_str()).unwrap_or("n/a"),
            concurrency = permits,
            "LlmServiceProfiles initialized"
        );

        Ok(Self {
            planner,
            synthesis,
            embedding: embedding_opt,
            ollama: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
            limiter: Arc::new(Semaphore::new(permits)),
            health: HealthService::new(health_timeout_secs)?,
        })
    }

    /// Generates text using the **planner** profile.
    ///
    /// # Errors
    /// Returns [`AiLlmError`] if generation fails.
    pub async fn generate_planner(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Generation, AiLlmError> {
        self.generate_with(&self.planner, prompt, system).await
    }

    /// Generates text using the **synthesis** profile.
    pub async fn generate_synthesis(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Generation, AiLlmError> {
        self.generate_with(&self.synthesis, prompt, system).await
    }

    /// Computes embeddings using the **embedding** profile.
    ///
    /// # Errors
    /// [`ConfigError::MissingVar`] when no embedding profile was
    /// configured; provider errors otherwise.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        let cfg = self
            .embedding
            .as_ref()
            .ok_or(ConfigError::MissingVar("EMBEDDING_MODEL"))?;

        let _permit = self.limiter.clone().acquire_owned().await.expect("limiter closed");

        match cfg.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(cfg).await?;
                cli.embeddings(input).await
            }
            LlmProvider::OpenAi => {
                let cli = self.get_or_init_openai(cfg).await?;
                cli.embeddings(input).await
            }
        }
    }

    /// Whether an embedding profile is configured.
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    /// Returns a health snapshot for all distinct profiles.
    pub async fn health_all(&self) -> Vec<HealthStatus> {
        let mut list = Vec::<LlmModelConfig>::with_capacity(3);
        list.push(self.planner.clone());
        if self.synthesis != self.planner {
            list.push(self.synthesis.clone());
        }
        if let Some(e) = &self.embedding {
            if *e != self.planner && *e != self.synthesis {
                list.push(e.clone());
            }
        }
        debug!(profiles = list.len(), "running health checks");
        self.health.check_many(&list).await
    }

    /// References to the current profiles `(planner, synthesis)`.
    pub fn profiles(&self) -> (&LlmModelConfig, &LlmModelConfig) {
        (&self.planner, &self.synthesis)
    }

    /// Cents spent for `total_tokens` under the planner profile's pricing.
    pub fn planner_cost_cents(&self, total_tokens: u64) -> f32 {
        self.planner.cost_cents(total_tokens)
    }

    /// Per-call generation cap of the planner profile, if configured.
    /// Budget-enforcing callers reserve this many completion tokens
    /// before dispatching a call.
    pub fn planner_max_tokens(&self) -> Option<u32> {
        self.planner.max_tokens
    }

    /* --------------------- Internals --------------------- */

    async fn generate_with(
        &self,
        cfg: &LlmModelConfig,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Generation, AiLlmError> {
        let _permit = self.limiter.clone().acquire_owned().await.expect("limiter closed");

        let res = match cfg.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(cfg).await?;
                cli.generate(prompt, system).await
            }
            LlmProvider::OpenAi => {
                let cli = self.get_or_init_openai(cfg).await?;
                cli.generate(prompt, system).await
            }
        };

        if let Ok(g) = &res {
            debug!(
                provider = %cfg.provider,
                model = %cfg.model,
                prompt_len = prompt.len(),
                tokens = g.total_tokens(),
                "generation completed"
            );
        }
        res
    }

    async fn get_or_init_ollama(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Arc<OllamaService>, AiLlmError> {
        let key = ClientKey::from(cfg);

        if let Some(cli) = self.ollama.read().await.get(&key).cloned() {
            return Ok(cli);
        }

        debug!(model = %cfg.model, endpoint = %cfg.endpoint, "ollama client init");
        let fresh = Arc::new(OllamaService::new(cfg.clone())?);

        let mut w = self.ollama.write().await;
        Ok(w.entry(key).or_insert(fresh).clone())
    }

    async fn get_or_init_openai(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Arc<OpenAiService>, AiLlmError> {
        let key = ClientKey::from(cfg);

        if let Some(cli) = self.openai.read().await.get(&key).cloned() {
            return Ok(cli);
        }

        debug!(model = %cfg.model, endpoint = %cfg.endpoint, "openai client init");
        let fresh = Arc::new(OpenAiService::new(cfg.clone())?);

        let mut w = self.openai.write().await;
        Ok(w.entry(key).or_insert(fresh).clone())
    }
}

/// Internal cache key to identify unique client configs.
///
/// `api_key` participates in the key to isolate clients with different
/// credentials; the key's fields are never logged.
#[derive(Clone, Eq, Debug)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<u64>,
}

impl From<&LlmModelConfig> for ClientKey {
    fn from(cfg: &LlmModelConfig) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout_secs,
        }
    }
}

impl PartialEq for ClientKey {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.endpoint == other.endpoint
            && self.model == other.model
            && self.api_key == other.api_key
            && self.timeout == other.timeout
    }
}

impl Hash for ClientKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.endpoint.hash(state);
        self.model.hash(state);
        if let Some(ref k) = self.api_key {
            k.hash(state);
        } else {
            0usize.hash(state);
        }
        self.timeout.hash(state);
    }
}
