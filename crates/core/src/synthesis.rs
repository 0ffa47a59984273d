use crate::error::SynthesisError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

pub const DEFAULT_TEMPERATURE: f32 = 1.0;

const SYSTEM_PROMPT: &str = "You are a medical information assistant specialised in diabetes. \
Answer only from the context passages you are given. If they do not contain the answer, say so. \
Answer in the language of the question.";

/// Turns a fully assembled prompt into answer text.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, SynthesisError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct ChatCompletionSynthesizer {
    client: Client,
    config: LlmConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionSynthesizer {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AnswerSynthesizer for ChatCompletionSynthesizer {
    async fn complete(&self, prompt: &str) -> Result<String, SynthesisError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        debug!(model = %self.config.model, prompt_chars = prompt.len(), "calling language model");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "temperature": self.config.temperature,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": prompt },
                ],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SynthesisError::BackendResponse {
                status: status.as_u16(),
                details: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(SynthesisError::EmptyAnswer)
    }
}
