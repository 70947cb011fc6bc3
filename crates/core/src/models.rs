//! # Triad Models
//!
//! Centralized LLM configuration types: which model each stage talks to and
//! where the OpenAI-compatible endpoint lives.

use serde::{Deserialize, Serialize};

/// Default model for planning and the per-agent calls
pub const DEFAULT_TASK_MODEL: &str = "openai/gpt-5-nano";

/// Default model for the final synthesis call
pub const DEFAULT_SYNTHESIS_MODEL: &str = "google/gemini-2.5-flash";

/// Model selection for one kind of call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Model identifier understood by the provider (e.g. "openai/gpt-5-nano")
    pub model: String,
    /// Optional completion token cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: None,
        }
    }

    /// Set a completion token cap
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Per-stage model selection.
///
/// The planner, agents and synthesizer may use different models; simplify and
/// validate share the task model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageModels {
    pub planner: ModelConfig,
    pub task: ModelConfig,
    pub synthesis: ModelConfig,
}

impl Default for StageModels {
    fn default() -> Self {
        Self {
            planner: ModelConfig::new(DEFAULT_TASK_MODEL).with_max_tokens(8192),
            task: ModelConfig::new(DEFAULT_TASK_MODEL),
            synthesis: ModelConfig::new(DEFAULT_SYNTHESIS_MODEL),
        }
    }
}

/// Connection settings for the OpenAI-compatible completion endpoint
#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GatewayConfig {
    /// Base URL, e.g. "https://openrouter.ai/api/v1"
    pub base_url: String,
    /// Bearer token; never serialized back out
    #[serde(default, skip_serializing)]
    pub api_key: String,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Full chat completions URL
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Whether both the endpoint and the key are present
    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
