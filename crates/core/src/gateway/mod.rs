//! # Completion Gateway
//!
//! The single seam between the pipeline and the model provider: text in,
//! text out, or a [`ProviderError`]. Implementations never retry.
//!
//! ```text
//! Stage skill ──CompletionRequest──▶ CompletionGateway ──HTTP──▶ provider
//!             ◀──── String | ProviderError ────┘
//! ```

pub mod openai;

#[cfg(test)]
pub mod scripted;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::error::ProviderError;
use crate::models::ModelConfig;

pub use openai::OpenAiGateway;

/// One completion call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionRequest {
    /// Short label for logs and test doubles, e.g. "plan" or "simplify:Layla"
    pub label: String,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(
        label: impl Into<String>,
        model: &ModelConfig,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            label: label.into(),
            model: model.model.clone(),
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature,
            max_tokens: model.max_tokens,
        }
    }
}

/// A fallible text completion provider
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn generate(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

/// Run one gateway call under a deadline; expiry becomes [`ProviderError::Timeout`]
pub async fn generate_with_timeout(
    gateway: &dyn CompletionGateway,
    request: CompletionRequest,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let label = request.label.clone();
    match tokio::time::timeout(timeout, gateway.generate(request)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(call = %label, "Completion call timed out after {:?}", timeout);
            Err(ProviderError::Timeout(timeout))
        }
    }
}
