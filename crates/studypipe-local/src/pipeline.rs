//! Orchestration: condense the page, call the model with a deadline, mine
//! concepts from the result.
//!
//! The deadline race is the load-bearing piece. A primary call that blows
//! the budget is dropped on the floor (its result can never surface) and one
//! retry runs on a much smaller input. Non-timeout failures propagate
//! immediately; retrying a hard error on a shorter input just burns time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use studypipe_core::{Error, PageDump, Quiz, Result, StructuredGenerator, Summarizer, SummaryStyle};

use crate::concepts::{self, DEFAULT_MAX_CONCEPTS, DEFAULT_MIN_CONCEPTS};
use crate::condense::{self, truncate_chars, DEFAULT_CHAR_CAP};
use crate::quiz;

/// Outer deadline for one model call before the fallback is tried.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 45_000;
/// Character budget for the fallback call's input.
pub const FALLBACK_INPUT_CHARS: usize = 3000;

/// Client-level timeouts sit this far past the outer deadline so the race,
/// not the HTTP client, decides who wins.
const CLIENT_SLACK_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct PipelineCfg {
    pub condense_cap: usize,
    pub call_timeout_ms: u64,
    pub fallback_input_chars: usize,
    pub max_concepts: usize,
    pub min_concepts: usize,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            condense_cap: DEFAULT_CHAR_CAP,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            fallback_input_chars: FALLBACK_INPUT_CHARS,
            max_concepts: DEFAULT_MAX_CONCEPTS,
            min_concepts: DEFAULT_MIN_CONCEPTS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryRun {
    pub summary: String,
    pub style: SummaryStyle,
    /// Ranked study concepts, best first.
    pub concepts: Vec<String>,
    pub condensed_chars: usize,
    /// True when the primary call timed out and the short retry answered.
    pub fallback_used: bool,
    pub timings_ms: BTreeMap<&'static str, u128>,
}

pub struct StudyPipeline {
    summarizer: Arc<dyn Summarizer>,
    generator: Arc<dyn StructuredGenerator>,
    cfg: PipelineCfg,
}

impl StudyPipeline {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        generator: Arc<dyn StructuredGenerator>,
        cfg: PipelineCfg,
    ) -> Self {
        Self {
            summarizer,
            generator,
            cfg,
        }
    }

    /// Summarize a page in the given style and mine its key concepts.
    pub async fn run_summary(&self, page: &PageDump, style: SummaryStyle) -> Result<SummaryRun> {
        let mut timings_ms = BTreeMap::new();

        let t = Instant::now();
        let condensed = condense::condense(&page.text, self.cfg.condense_cap);
        timings_ms.insert("condense", t.elapsed().as_millis());

        let prefix = style.directive();
        let input = compose_input(prefix, &condensed);

        let t = Instant::now();
        let (summary, fallback_used) = self
            .summarize_with_fallback(&input, &condensed, prefix)
            .await?;
        timings_ms.insert("summarize", t.elapsed().as_millis());

        let t = Instant::now();
        let mut concepts =
            concepts::extract_key_concepts(&summary, &page.text, self.cfg.max_concepts);
        concepts::ensure_min_concepts(&mut concepts, &page.text, self.cfg.min_concepts);
        timings_ms.insert("concepts", t.elapsed().as_millis());

        Ok(SummaryRun {
            summary,
            style,
            concepts,
            condensed_chars: condensed.chars().count(),
            fallback_used,
            timings_ms,
        })
    }

    /// Generate a quiz from page text. Malformed model output is "no quiz",
    /// not an error; so is an empty page.
    pub async fn generate_quiz(&self, page_text: &str) -> Result<Option<Quiz>> {
        let condensed = condense::condense(page_text, self.cfg.condense_cap);
        if condensed.is_empty() {
            return Ok(None);
        }
        let schema = quiz::quiz_schema();
        let raw = self.generate_with_fallback(&condensed, &schema).await?;
        Ok(quiz::quiz_from_model_output(&raw))
    }

    /// Explain one concept against the page. No deadline race here; the
    /// prompt is small and an explanation has no cheaper fallback.
    pub async fn explain(&self, term: &str, context: &str) -> Result<String> {
        let condensed = condense::condense(context, self.cfg.condense_cap);
        let prompt = format!(
            "Explain the concept \"{term}\" in 3\u{2013}5 bullet points with a simple example.\n\nContext:\n{condensed}"
        );
        self.summarizer.summarize(&prompt, self.cfg.call_timeout_ms).await
    }

    async fn summarize_with_fallback(
        &self,
        input: &str,
        condensed: &str,
        prefix: &str,
    ) -> Result<(String, bool)> {
        let deadline = Duration::from_millis(self.cfg.call_timeout_ms);
        let call_ms = self.cfg.call_timeout_ms.saturating_add(CLIENT_SLACK_MS);
        match tokio::time::timeout(deadline, self.summarizer.summarize(input, call_ms)).await {
            Ok(Ok(summary)) => Ok((summary, false)),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => {
                let short = truncate_chars(condensed, self.cfg.fallback_input_chars);
                let retry_input = compose_input(prefix, &short);
                match self.summarizer.summarize(&retry_input, call_ms).await {
                    Ok(summary) => Ok((summary, true)),
                    Err(e) => Err(Error::Model(format!(
                        "timed out after {}ms and the short retry failed: {e}",
                        self.cfg.call_timeout_ms
                    ))),
                }
            }
        }
    }

    async fn generate_with_fallback(
        &self,
        context: &str,
        schema: &serde_json::Value,
    ) -> Result<String> {
        let deadline = Duration::from_millis(self.cfg.call_timeout_ms);
        let call_ms = self.cfg.call_timeout_ms.saturating_add(CLIENT_SLACK_MS);
        let prompt = quiz::quiz_prompt(context);
        match tokio::time::timeout(deadline, self.generator.generate_json(&prompt, schema, call_ms))
            .await
        {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => {
                let short = truncate_chars(context, self.cfg.fallback_input_chars);
                let retry_prompt = quiz::quiz_prompt(&short);
                self.generator
                    .generate_json(&retry_prompt, schema, call_ms)
                    .await
                    .map_err(|e| {
                        Error::Model(format!(
                            "timed out after {}ms and the short retry failed: {e}",
                            self.cfg.call_timeout_ms
                        ))
                    })
            }
        }
    }
}

fn compose_input(prefix: &str, condensed: &str) -> String {
    if prefix.is_empty() {
        condensed.to_string()
    } else {
        format!("{prefix}\n\n{condensed}")
    }
}
