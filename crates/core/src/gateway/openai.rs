//! OpenAI-compatible chat completions gateway.

use async_trait::async_trait;
use serde::Deserialize;

use super::{CompletionGateway, CompletionRequest};
use crate::error::ProviderError;
use crate::models::GatewayConfig;

/// Gateway backed by any `/chat/completions` endpoint (OpenAI, OpenRouter, ...)
pub struct OpenAiGateway {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl OpenAiGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing client (shared connection pool)
    pub fn with_client(config: GatewayConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn build_request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    #[tracing::instrument(skip_all, fields(call = %request.label, model = %request.model))]
    async fn generate(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let body = Self::build_request_body(&request);

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body_text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        match status {
            200..=299 => {}
            429 => return Err(ProviderError::RateLimited(body_text)),
            _ => {
                return Err(ProviderError::Status {
                    status,
                    body: body_text,
                })
            }
        }

        let parsed: ChatResponse = serde_json::from_str(&body_text)
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse response: {}", e)))?;

        let content = extract_content(parsed)?;
        tracing::debug!(chars = content.len(), "Completion received");
        Ok(content)
    }
}

fn extract_content(response: ChatResponse) -> Result<String, ProviderError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .unwrap_or_default();

    if content.trim().is_empty() {
        Err(ProviderError::Empty)
    } else {
        Ok(content)
    }
}

/// Chat completions response format
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
