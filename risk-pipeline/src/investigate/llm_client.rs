//! Enum-dispatch LLM client for the investigator.
//!
//! No trait objects: the planner is either the shared service profiles or
//! a replay script. Replay feeds canned responses in order — the
//! deterministic harness behind idempotence tests and offline debugging
//! of recorded investigations. An exhausted replay behaves like a
//! provider outage, which is exactly how tests simulate one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ai_llm_service::{Generation, LlmServiceProfiles};

use crate::errors::LlmCallError;

/// The investigator's view of the LLM.
pub enum PlannerClient {
    /// Live provider via the shared service profiles.
    Service(Arc<LlmServiceProfiles>),
    /// Scripted responses, consumed in order.
    Replay(ReplayClient),
}

impl PlannerClient {
    /// One planner-turn generation (hop prompts).
    pub async fn generate_hop(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<Generation, LlmCallError> {
        match self {
            Self::Service(svc) => svc
                .generate_planner(prompt, Some(system))
                .await
                .map_err(|e| LlmCallError::Unavailable(e.to_string())),
            Self::Replay(replay) => replay.next(prompt),
        }
    }

    /// Final synthesis generation.
    pub async fn generate_synthesis(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<Generation, LlmCallError> {
        match self {
            Self::Service(svc) => svc
                .generate_synthesis(prompt, Some(system))
                .await
                .map_err(|e| LlmCallError::Unavailable(e.to_string())),
            Self::Replay(replay) => replay.next(prompt),
        }
    }

    /// Query embedding for incident search; `None` when no embedding
    /// profile is configured or the provider fails (search degrades to
    /// text-only).
    pub async fn embed(&self, input: &str) -> Option<Vec<f32>> {
        match self {
            Self::Service(svc) if svc.has_embedding() => svc.embed(input).await.ok(),
            _ => None,
        }
    }

    /// Cents spent for `tokens` under the active pricing.
    pub fn cost_cents(&self, tokens: u64) -> f32 {
        match self {
            Self::Service(svc) => svc.planner_cost_cents(tokens),
            Self::Replay(_) => 0.0,
        }
    }

    /// Upper bound on completion tokens one call can produce. Comes from
    /// the provider's configured generation cap; budget checks reserve
    /// this amount so recorded usage stays within the token budget.
    pub fn completion_allowance(&self) -> u64 {
        match self {
            Self::Service(svc) => svc
                .planner_max_tokens()
                .map_or(DEFAULT_COMPLETION_ALLOWANCE, u64::from),
            Self::Replay(_) => DEFAULT_COMPLETION_ALLOWANCE,
        }
    }
}

/// Reserve when the provider declares no generation cap.
pub const DEFAULT_COMPLETION_ALLOWANCE: u64 = 1_024;

/// Scripted client: pops one canned response per call.
pub struct ReplayClient {
    queue: Mutex<VecDeque<String>>,
}

impl ReplayClient {
    pub fn new<I, S>(scripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(scripts.into_iter().map(Into::into).collect()),
        }
    }

    /// An always-failing client (simulates a provider outage).
    pub fn unavailable() -> Self {
        Self::new(Vec::<String>::new())
    }

    fn next(&self, prompt: &str) -> Result<Generation, LlmCallError> {
        let mut q = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        let text = q.pop_front().ok_or(LlmCallError::Exhausted)?;
        // Rough usage mirroring what a live provider would report.
        Ok(Generation {
            prompt_tokens: (prompt.len() / 4) as u32,
            completion_tokens: (text.len() / 4) as u32,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_pops_in_order_then_exhausts() {
        let client = PlannerClient::Replay(ReplayClient::new(["one", "two"]));
        let a = client.generate_hop("p", "s").await.unwrap();
        assert_eq!(a.text, "one");
        let b = client.generate_hop("p", "s").await.unwrap();
        assert_eq!(b.text, "two");
        assert!(matches!(
            client.generate_hop("p", "s").await,
            Err(LlmCallError::Exhausted)
        ));
    }

    #[tokio::test]
    async fn replay_reports_token_estimates() {
        let client = PlannerClient::Replay(ReplayClient::new(["x".repeat(400)]));
        let generation = client.generate_hop(&"y".repeat(400), "s").await.unwrap();
        assert_eq!(generation.prompt_tokens, 100);
        assert_eq!(generation.completion_tokens, 100);
    }
}
