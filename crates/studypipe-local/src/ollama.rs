//! Ollama chat backend (`/api/chat`), opt-in via environment.

use serde::{Deserialize, Serialize};
use studypipe_core::{Error, Result, StructuredGenerator, Summarizer};

use crate::{JSON_SYSTEM_PROMPT, SUMMARIZE_SYSTEM_PROMPT};

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_bool(key: &str) -> bool {
    env(key)
        .and_then(|s| s.parse::<bool>().ok())
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        // Opt-in: don't accidentally start calling localhost if the user didn't ask for it.
        let enabled = env_bool("STUDYPIPE_OLLAMA_ENABLE");
        if !enabled {
            return Err(Error::NotConfigured(
                "STUDYPIPE_OLLAMA_ENABLE is not set (or false)".to_string(),
            ));
        }
        let base_url =
            env("STUDYPIPE_OLLAMA_BASE_URL").unwrap_or_else(|| "http://127.0.0.1:11434".to_string());
        // Small instruct models handle summarize/quiz prompts well enough locally.
        let model = env("STUDYPIPE_OLLAMA_MODEL").unwrap_or_else(|| "qwen2.5:3b-instruct".to_string());
        Ok(Self {
            client,
            base_url,
            model,
        })
    }

    fn endpoint_chat(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        format: Option<serde_json::Value>,
        timeout_ms: u64,
    ) -> Result<String> {
        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: Some(false),
            format,
        };

        let resp = self
            .client
            .post(self.endpoint_chat())
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Model(format!("ollama chat HTTP {status}")));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| Error::Model(e.to_string()))?;
        Ok(parsed.message.content)
    }
}

#[async_trait::async_trait]
impl Summarizer for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn summarize(&self, input: &str, timeout_ms: u64) -> Result<String> {
        self.chat(SUMMARIZE_SYSTEM_PROMPT, input, None, timeout_ms).await
    }
}

#[async_trait::async_trait]
impl StructuredGenerator for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate_json(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
        timeout_ms: u64,
    ) -> Result<String> {
        // Ollama enforces the schema server-side via the `format` field.
        self.chat(JSON_SYSTEM_PROMPT, prompt, Some(schema.clone()), timeout_ms)
            .await
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}
