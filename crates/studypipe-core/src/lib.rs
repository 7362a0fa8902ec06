use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("restricted page: {0}")]
    RestrictedPage(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("model call failed: {0}")]
    Model(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("highlight failed: {0}")]
    Highlight(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A page as handed to the pipeline: cleaned text plus provenance.
///
/// `title` and `url` may be empty (custom text input has neither).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDump {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub text: String,
}

impl PageDump {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            title: String::new(),
            url: String::new(),
            text: text.into(),
        }
    }
}

/// Requested summary shape. Each style maps to a directive line that is
/// prepended to the summarizer prompt ("tldr" adds nothing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryStyle {
    Tldr,
    Bullets,
    StudyNotes,
}

impl SummaryStyle {
    /// Parse a user-facing style name. Allowed: tldr, bullets, study-notes
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tldr" => Some(Self::Tldr),
            "bullets" => Some(Self::Bullets),
            "study-notes" => Some(Self::StudyNotes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tldr => "tldr",
            Self::Bullets => "bullets",
            Self::StudyNotes => "study-notes",
        }
    }

    pub fn directive(&self) -> &'static str {
        match self {
            Self::Tldr => "",
            Self::Bullets => "Return 5\u{2013}9 concise key bullet points in markdown.",
            Self::StudyNotes => {
                "Write concise study notes in markdown with short headings and bullet points. \
                 Include key definitions, steps, and any formulas if present."
            }
        }
    }
}

/// One multiple-choice question. Field names follow the generation schema
/// (`q`, `options`, `answer`, `explanation`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizQuestion {
    pub q: String,
    /// Exactly four non-empty options once normalized.
    pub options: Vec<String>,
    /// Index into `options`, always in 0..=3 once normalized.
    pub answer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quiz {
    pub questions: Vec<QuizQuestion>,
}

impl Quiz {
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Plain-text rendering with A-D lettered options, for terminal output.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (i, q) in self.questions.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("{}. {}\n", i + 1, q.q));
            for (j, opt) in q.options.iter().enumerate() {
                let letter = (b'A' + j as u8) as char;
                out.push_str(&format!("   {letter}. {opt}\n"));
            }
            let letter = (b'A' + q.answer.min(3) as u8) as char;
            out.push_str(&format!("   Answer: {letter}\n"));
            if let Some(e) = &q.explanation {
                if !e.is_empty() {
                    out.push_str(&format!("   Explanation: {e}\n"));
                }
            }
        }
        out
    }
}

/// Free-form text generation against page content (summaries, explanations).
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn summarize(&self, input: &str, timeout_ms: u64) -> Result<String>;
}

/// Schema-constrained JSON generation (quiz questions).
///
/// Implementations return the raw model output; callers run it through the
/// tolerant parser since models routinely wrap JSON in prose or fences.
#[async_trait::async_trait]
pub trait StructuredGenerator: Send + Sync {
    fn name(&self) -> &'static str;
    async fn generate_json(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
        timeout_ms: u64,
    ) -> Result<String>;
}
