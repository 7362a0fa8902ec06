//! OpenAI-compatible chat backend (`/v1/chat/completions`).
//!
//! Works against any server speaking the chat-completions dialect (OpenAI,
//! vLLM, llama.cpp server, LM Studio). Structured output rides on
//! `response_format` with a JSON schema; servers that ignore it still get
//! caught by the tolerant quiz parser downstream.

use serde::{Deserialize, Serialize};
use studypipe_core::{Error, Result, StructuredGenerator, Summarizer};

use crate::{JSON_SYSTEM_PROMPT, SUMMARIZE_SYSTEM_PROMPT};

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatClient {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let base_url = env("STUDYPIPE_OPENAI_COMPAT_BASE_URL").ok_or_else(|| {
            Error::NotConfigured("missing STUDYPIPE_OPENAI_COMPAT_BASE_URL".to_string())
        })?;
        let api_key = env("STUDYPIPE_OPENAI_COMPAT_API_KEY");
        let model = env("STUDYPIPE_OPENAI_COMPAT_MODEL").ok_or_else(|| {
            Error::NotConfigured("missing STUDYPIPE_OPENAI_COMPAT_MODEL".to_string())
        })?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    fn endpoint_chat_completions(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        response_format: Option<serde_json::Value>,
        timeout_ms: u64,
    ) -> Result<String> {
        let req = ChatCompletionsRequest {
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
            response_format,
        };

        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Model(format!("openai-compat chat HTTP {status}")));
        }

        let parsed: ChatCompletionsResponse =
            resp.json().await.map_err(|e| Error::Model(e.to_string()))?;
        Ok(parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl Summarizer for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai-compat"
    }

    async fn summarize(&self, input: &str, timeout_ms: u64) -> Result<String> {
        self.chat(SUMMARIZE_SYSTEM_PROMPT, input, None, timeout_ms).await
    }
}

#[async_trait::async_trait]
impl StructuredGenerator for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai-compat"
    }

    async fn generate_json(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
        timeout_ms: u64,
    ) -> Result<String> {
        let response_format = serde_json::json!({
            "type": "json_schema",
            "json_schema": { "name": "response", "strict": true, "schema": schema }
        });
        self.chat(JSON_SYSTEM_PROMPT, prompt, Some(response_format), timeout_ms)
            .await
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}
