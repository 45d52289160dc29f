pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub const RATE_LIMIT_APOLOGY: &str = "❌ **Lo siento, hemos superado nuestro límite de solicitudes por ahora. Por favor, intenta de nuevo más tarde.**";
pub const SERVICE_APOLOGY: &str = "❌ **Ha ocurrido un error al consultar al asistente. Por favor, intenta de nuevo más tarde.**";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion rate limit reached")]
    RateLimited,

    #[error("completion service error: {0}")]
    Service(String),
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> Result<String, CompletionError>;
}

/// Answers a free-text question, falling back to a fixed apology on failure.
pub async fn answer(llm: &dyn LlmProvider, question: &str) -> String {
    let messages = [Message {
        role: "user".to_string(),
        content: question.to_string(),
    }];

    match llm.chat(SYSTEM_PROMPT, &messages).await {
        Ok(text) => text.trim().to_string(),
        Err(CompletionError::RateLimited) => {
            tracing::error!("completion rate limit reached");
            RATE_LIMIT_APOLOGY.to_string()
        }
        Err(e) => {
            tracing::error!(error = %e, "completion request failed");
            SERVICE_APOLOGY.to_string()
        }
    }
}
