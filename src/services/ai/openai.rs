use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use super::{CompletionError, LlmProvider, Message};

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client,
        })
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> Result<String, CompletionError> {
        let mut chat_messages = vec![json!({
            "role": "system",
            "content": system_prompt,
        })];

        for msg in messages {
            chat_messages.push(json!({
                "role": msg.role,
                "content": msg.content,
            }));
        }

        let body = json!({
            "model": self.model,
            "messages": chat_messages,
            "max_tokens": 150,
            "temperature": 0.5,
        });

        // One retry on timeouts and connection failures.
        let resp = match self.send(&body).await {
            Err(e) if e.is_timeout() || e.is_connect() => {
                tracing::warn!(error = %e, "completion request failed, retrying once");
                self.send(&body).await
            }
            other => other,
        }
        .map_err(|e| CompletionError::Service(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CompletionError::RateLimited);
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CompletionError::Service(format!("failed to parse response: {e}")))?;

        if !status.is_success() {
            return Err(CompletionError::Service(format!("API error ({status}): {data}")));
        }

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CompletionError::Service("missing content in response".to_string()))
    }
}
