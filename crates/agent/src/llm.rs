use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use curbside_core::config::{LlmConfig, LlmProvider};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport failed: {0}")]
    Transport(String),
    #[error("llm returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response was malformed: {0}")]
    MalformedResponse(String),
}

/// Completion port for the language-understanding service.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, LlmError>;
}

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const MAX_COMPLETION_TOKENS: u32 = 500;

/// HTTP implementation speaking either the Anthropic messages API or an
/// OpenAI-compatible chat-completions API, per configuration. Requests are
/// bounded by the configured timeout so a slow provider cannot hold an
/// inbound webhook open.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let default_base = match config.provider {
            LlmProvider::Anthropic => ANTHROPIC_BASE_URL,
            LlmProvider::OpenAi => OPENAI_BASE_URL,
            LlmProvider::Ollama => OLLAMA_BASE_URL,
        };

        Ok(Self {
            client,
            provider: config.provider,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_string()),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn complete_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, LlmError> {
        match self.provider {
            LlmProvider::Anthropic => self.complete_anthropic(system_prompt, user_prompt).await,
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                self.complete_chat(system_prompt, user_prompt).await
            }
        }
    }

    async fn complete_anthropic(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, LlmError> {
        let mut request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("anthropic-version", "2023-06-01")
            .json(&json!({
                "model": self.model,
                "max_tokens": MAX_COMPLETION_TOKENS,
                "system": system_prompt,
                "messages": [{"role": "user", "content": user_prompt}],
            }));
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let payload = send_for_json(request).await?;
        payload["content"][0]["text"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| LlmError::MalformedResponse("missing content[0].text".to_string()))
    }

    async fn complete_chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, LlmError> {
        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system_prompt},
                    {"role": "user", "content": user_prompt},
                ],
            }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let payload = send_for_json(request).await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| {
                LlmError::MalformedResponse("missing choices[0].message.content".to_string())
            })
    }
}

async fn send_for_json(request: reqwest::RequestBuilder) -> Result<Value, LlmError> {
    let response =
        request.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;

    let status = response.status();
    let body = response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;
    if !status.is_success() {
        return Err(LlmError::Status { status: status.as_u16(), body });
    }

    serde_json::from_str(&body).map_err(|error| LlmError::MalformedResponse(error.to_string()))
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, LlmError> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.complete_once(system_prompt, user_prompt).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    warn!(attempt, error = %error, "llm completion attempt failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Transport("no completion attempts ran".to_string())))
    }
}
