//! Quiz prompt, schema, and tolerant normalization of model output.
//!
//! Models asked for JSON return JSON-ish: fenced blocks, prose wrappers,
//! floats where integers belong. Parsing here is forgiving about packaging
//! and strict about shape; anything that cannot be coerced into well-formed
//! questions is dropped, and a fully empty result is "no quiz", not an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use studypipe_core::{Quiz, QuizQuestion};

/// A quiz asks for exactly this many questions; fewer survive normalization
/// if the model under-delivers, extras are cut.
pub const QUIZ_QUESTIONS: usize = 4;
/// Every question carries exactly this many options.
pub const QUIZ_OPTIONS: usize = 4;

static FENCE_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)```(?:json)?\s*(.*?)```").expect("fence regex"));

/// Parse output that should be JSON but often is not quite: strict parse
/// first, then the first fenced block, then the outermost brace span.
pub fn parse_loose_json(raw: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str(raw) {
        return Some(v);
    }
    if let Some(m) = FENCE_RX.captures(raw).and_then(|c| c.get(1)) {
        if let Ok(v) = serde_json::from_str(m.as_str()) {
            return Some(v);
        }
    }
    if let (Some(first), Some(last)) = (raw.find('{'), raw.rfind('}')) {
        if last > first {
            if let Ok(v) = serde_json::from_str(&raw[first..=last]) {
                return Some(v);
            }
        }
    }
    None
}

fn string_item(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn string_field(q: &Value, key: &str) -> String {
    q.get(key).map(string_item).unwrap_or_default()
}

/// Correct-answer index, clamped into range. Integral floats count as
/// integers (models emit `1.0`); anything else lands on 0.
fn answer_index(q: &Value) -> usize {
    match q.get("answer") {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i.clamp(0, QUIZ_OPTIONS as i64 - 1) as usize
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    (f as i64).clamp(0, QUIZ_OPTIONS as i64 - 1) as usize
                } else {
                    0
                }
            } else {
                0
            }
        }
        _ => 0,
    }
}

/// Normalize parsed JSON into a quiz. Accepts `{"questions": [...]}` or a
/// bare top-level array. Questions missing a prompt or a full option set are
/// dropped rather than failing the whole quiz.
pub fn quiz_from_value(v: &Value) -> Option<Quiz> {
    let questions = match v {
        Value::Object(map) => map.get("questions")?.as_array()?,
        Value::Array(a) => a,
        _ => return None,
    };

    let mut out = Vec::new();
    for q in questions.iter().take(QUIZ_QUESTIONS) {
        let text = string_field(q, "q");
        let options: Vec<String> = q
            .get("options")
            .and_then(Value::as_array)
            .map(|a| a.iter().take(QUIZ_OPTIONS).map(string_item).collect())
            .unwrap_or_default();
        if text.is_empty() || options.len() != QUIZ_OPTIONS || options.iter().any(String::is_empty)
        {
            continue;
        }
        let explanation = {
            let e = string_field(q, "explanation");
            (!e.is_empty()).then_some(e)
        };
        out.push(QuizQuestion {
            q: text,
            options,
            answer: answer_index(q),
            explanation,
        });
    }
    if out.is_empty() {
        return None;
    }
    Some(Quiz { questions: out })
}

pub fn quiz_from_model_output(raw: &str) -> Option<Quiz> {
    parse_loose_json(raw).as_ref().and_then(quiz_from_value)
}

pub fn quiz_prompt(context: &str) -> String {
    [
        "Create a 4-question multiple-choice quiz based ONLY on the content below.",
        "- Each question: exactly 4 options, exactly one correct answer.",
        "- Make distractors plausible but clearly incorrect.",
        "- Keep questions concise and unambiguous.",
        "- Return ONLY JSON that matches the provided schema.",
        "",
        "CONTENT:",
        context,
    ]
    .join("\n")
}

/// JSON schema handed to structured-output backends.
pub fn quiz_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["questions"],
        "properties": {
            "questions": {
                "type": "array",
                "minItems": QUIZ_QUESTIONS,
                "maxItems": QUIZ_QUESTIONS,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["q", "options", "answer"],
                    "properties": {
                        "q": { "type": "string", "minLength": 3 },
                        "options": {
                            "type": "array",
                            "minItems": QUIZ_OPTIONS,
                            "maxItems": QUIZ_OPTIONS,
                            "items": { "type": "string", "minLength": 1 }
                        },
                        "answer": { "type": "integer", "minimum": 0, "maximum": QUIZ_OPTIONS - 1 },
                        "explanation": { "type": "string" }
                    }
                }
            }
        }
    })
}
