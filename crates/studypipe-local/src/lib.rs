//! Local implementations for studypipe: page fetching, text extraction,
//! condensing, concept mining, highlighting, and model backends.

pub mod concepts;
pub mod condense;
pub mod dom;
pub mod extract;
pub mod highlight;
pub mod ollama;
pub mod openai_compat;
pub mod pipeline;
pub mod quiz;

use std::sync::Arc;
use std::time::Duration;

use studypipe_core::{Error, Result, StructuredGenerator, Summarizer};

/// Framing for summarize-style calls; the per-style directive travels at the
/// top of the user input.
pub(crate) const SUMMARIZE_SYSTEM_PROMPT: &str = "You turn web page content into study material. \
Follow any instruction lines at the top of the input, answer in Markdown, and never invent facts \
that are not in the provided content.";

pub(crate) const JSON_SYSTEM_PROMPT: &str =
    "Return only valid JSON that satisfies the provided schema. No prose, no code fences.";

#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Fetched bodies are cut at this many bytes unless STUDYPIPE_FETCH_MAX_BYTES
/// says otherwise.
pub const DEFAULT_FETCH_MAX_BYTES: u64 = 5_000_000;

/// Browser-internal surfaces that never hold readable page content.
const RESTRICTED_SCHEMES: &[&str] = &[
    "chrome",
    "edge",
    "about",
    "chrome-extension",
    "moz-extension",
    "chromewebstore",
    "view-source",
    "devtools",
];

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    /// Where redirects landed.
    pub final_url: String,
    pub status: u16,
    pub html: String,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl PageFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("studypipe/0.1")
            .redirect(reqwest::redirect::Policy::limited(10))
            // Safety defaults: avoid "hang forever" on DNS/TLS/body stalls.
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: env_u64("STUDYPIPE_FETCH_MAX_BYTES", DEFAULT_FETCH_MAX_BYTES),
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Reject URLs the pipeline can never study before touching the network.
    pub fn vet_url(raw: &str) -> Result<url::Url> {
        let url =
            url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
        match url.scheme() {
            "http" | "https" | "file" => Ok(url),
            s if RESTRICTED_SCHEMES.contains(&s) => Err(Error::RestrictedPage(format!(
                "{s}:// pages cannot be read; point at a regular web page or pass the text directly"
            ))),
            s => Err(Error::RestrictedPage(format!(
                "unsupported scheme {s}://; point at a regular web page or pass the text directly"
            ))),
        }
    }

    /// Fetch a page body, streaming and cutting at the byte budget so a
    /// pathological server cannot balloon memory.
    pub async fn fetch_page(&self, raw_url: &str) -> Result<FetchedPage> {
        let url = Self::vet_url(raw_url)?;
        if url.scheme() == "file" {
            return self.read_file_url(&url).await;
        }

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;
        let final_url = resp.url().to_string();
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {status} for {final_url}")));
        }

        let max_bytes = self.max_bytes as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedPage {
            url: raw_url.to_string(),
            final_url,
            status: status.as_u16(),
            html: String::from_utf8_lossy(&bytes).to_string(),
            truncated,
        })
    }

    async fn read_file_url(&self, url: &url::Url) -> Result<FetchedPage> {
        let path = url
            .to_file_path()
            .map_err(|_| Error::InvalidUrl(format!("not a local file path: {url}")))?;
        let bytes = tokio::task::spawn_blocking(move || std::fs::read(&path))
            .await
            .map_err(|e| Error::Fetch(format!("file read join failed: {e}")))?
            .map_err(|e| Error::Fetch(format!("file read failed: {e}")))?;
        let max_bytes = self.max_bytes as usize;
        let truncated = bytes.len() > max_bytes;
        let body = if truncated { &bytes[..max_bytes] } else { &bytes[..] };
        Ok(FetchedPage {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            html: String::from_utf8_lossy(body).to_string(),
            truncated,
        })
    }
}

/// Summarizer and structured-output halves of one configured backend.
pub struct ModelHandles {
    pub summarizer: Arc<dyn Summarizer>,
    pub generator: Arc<dyn StructuredGenerator>,
    pub provider: &'static str,
}

impl std::fmt::Debug for ModelHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandles")
            .field("summarizer", &self.summarizer.name())
            .field("generator", &self.generator.name())
            .field("provider", &self.provider)
            .finish()
    }
}

fn ollama_handles(client: reqwest::Client) -> Result<ModelHandles> {
    let c = Arc::new(ollama::OllamaClient::from_env(client)?);
    Ok(ModelHandles {
        summarizer: c.clone(),
        generator: c,
        provider: "ollama",
    })
}

fn openai_compat_handles(client: reqwest::Client) -> Result<ModelHandles> {
    let c = Arc::new(openai_compat::OpenAiCompatClient::from_env(client)?);
    Ok(ModelHandles {
        summarizer: c.clone(),
        generator: c,
        provider: "openai-compat",
    })
}

/// Pick a model backend from the environment.
/// Allowed providers: auto (openai-compat if configured, else ollama),
/// ollama, openai-compat.
pub fn model_from_env(client: reqwest::Client) -> Result<ModelHandles> {
    let provider = env("STUDYPIPE_MODEL_PROVIDER").unwrap_or_else(|| "auto".to_string());
    match provider.as_str() {
        "ollama" => ollama_handles(client),
        "openai-compat" => openai_compat_handles(client),
        "auto" => match openai_compat_handles(client.clone()) {
            Ok(h) => Ok(h),
            Err(Error::NotConfigured(_)) => match ollama_handles(client) {
                Ok(h) => Ok(h),
                Err(Error::NotConfigured(_)) => Err(Error::NotConfigured(
                    "no model backend: set STUDYPIPE_OPENAI_COMPAT_BASE_URL and \
STUDYPIPE_OPENAI_COMPAT_MODEL, or STUDYPIPE_OLLAMA_ENABLE=true"
                        .to_string(),
                )),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        },
        other => Err(Error::NotConfigured(format!(
            "unknown model provider {other} (allowed: auto, ollama, openai-compat)"
        ))),
    }
}
