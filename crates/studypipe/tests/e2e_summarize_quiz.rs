use axum::{routing::post, Json, Router};
use std::net::SocketAddr;

const PAGE: &str = r#"<!doctype html>
<html>
<head><title>Photosynthesis - Study Notes</title></head>
<body>
  <nav><a href="/home">Home</a></nav>
  <article>
    <h1>Photosynthesis</h1>
    <p>Photosynthesis converts light energy into chemical energy inside chloroplasts.</p>
    <p>Chlorophyll absorbs mostly red and blue light and reflects green light.</p>
    <p>Plants with more chlorophyll look darker green in bright light.</p>
  </article>
</body>
</html>
"#;

const SUMMARY_TEXT: &str = "All about **photosynthesis** and **chlorophyll** in plants.";

fn quiz_payload() -> String {
    serde_json::json!({
        "questions": [
            {
                "q": "What does photosynthesis convert?",
                "options": ["Light energy", "Sound", "Pressure", "Momentum"],
                "answer": 0,
                "explanation": "Light energy becomes chemical energy."
            },
            {
                "q": "Which pigment absorbs red and blue light?",
                "options": ["Carotene", "Chlorophyll", "Melanin", "Hemoglobin"],
                "answer": 1
            },
            {
                "q": "Where does photosynthesis happen?",
                "options": ["Mitochondria", "Nucleus", "Chloroplasts", "Ribosomes"],
                "answer": 2
            },
            {
                "q": "What color does chlorophyll reflect?",
                "options": ["Red", "Blue", "Yellow", "Green"],
                "answer": 3
            }
        ]
    })
    .to_string()
}

/// Minimal openai-compatible chat stub: structured requests (the ones that
/// carry `response_format`) get quiz JSON, plain requests get a summary.
async fn spawn_stub() -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<serde_json::Value>| async move {
            let content = if body.get("response_format").is_some() {
                quiz_payload()
            } else {
                SUMMARY_TEXT.to_string()
            };
            Json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// The real binary, pointed at the stub and stripped of inherited config.
fn studypipe_cmd(base_url: &str) -> tokio::process::Command {
    let bin = assert_cmd::cargo::cargo_bin!("studypipe");
    let mut cmd = tokio::process::Command::new(bin);
    cmd.env_remove("STUDYPIPE_ENV_FILE")
        .env_remove("STUDYPIPE_OLLAMA_ENABLE")
        .env_remove("STUDYPIPE_OPENAI_COMPAT_API_KEY")
        .env("STUDYPIPE_MODEL_PROVIDER", "openai-compat")
        .env("STUDYPIPE_OPENAI_COMPAT_BASE_URL", base_url)
        .env("STUDYPIPE_OPENAI_COMPAT_MODEL", "test-model");
    cmd
}

fn write_page(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("page.html");
    std::fs::write(&path, PAGE).expect("write fixture");
    path
}

#[tokio::test]
async fn summarize_json_reports_summary_and_concepts() {
    let base = spawn_stub().await;
    let tmp = tempfile::tempdir().unwrap();
    let page = write_page(&tmp);

    let out = studypipe_cmd(&base)
        .args(["summarize", "--file", page.to_str().unwrap(), "--output", "json"])
        .output()
        .await
        .expect("run studypipe summarize");

    assert!(
        out.status.success(),
        "summarize failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("parse summarize json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("summary"));
    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["provider"].as_str(), Some("openai-compat"));
    assert_eq!(v["style"].as_str(), Some("tldr"));
    assert_eq!(v["summary"].as_str(), Some(SUMMARY_TEXT));
    assert_eq!(v["fallback_used"].as_bool(), Some(false));
    assert!(v["condensed_chars"].as_u64().unwrap_or(0) > 0);
    assert!(v["timings_ms"].get("summarize").is_some());

    let concepts: Vec<&str> = v["concepts"]
        .as_array()
        .expect("concepts array")
        .iter()
        .filter_map(|c| c.as_str())
        .collect();
    // Bolded summary terms that actually occur in the page lead the list.
    assert_eq!(concepts.first().copied(), Some("photosynthesis"));
    assert!(concepts.contains(&"chlorophyll"));
}

#[tokio::test]
async fn summarize_annotates_html_when_asked() {
    let base = spawn_stub().await;
    let tmp = tempfile::tempdir().unwrap();
    let page = write_page(&tmp);
    let annotated = tmp.path().join("annotated.html");

    let out = studypipe_cmd(&base)
        .args([
            "summarize",
            "--file",
            page.to_str().unwrap(),
            "--annotate-out",
            annotated.to_str().unwrap(),
            "--output",
            "json",
        ])
        .output()
        .await
        .expect("run studypipe summarize --annotate-out");

    assert!(
        out.status.success(),
        "summarize failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("parse summarize json");
    assert!(v["highlights"]["marks_placed"].as_u64().unwrap_or(0) >= 2);

    let html = std::fs::read_to_string(&annotated).expect("read annotated html");
    // First occurrence gets wrapped with the page's own casing.
    assert!(html.contains(r#"<mark class="concept-mark" data-concept="photosynthesis">Photosynthesis</mark>"#));
    assert!(html.contains(r#"data-concept="chlorophyll""#));
}

#[tokio::test]
async fn summarize_text_output_lists_key_concepts() {
    let base = spawn_stub().await;
    let tmp = tempfile::tempdir().unwrap();
    let page = write_page(&tmp);

    let out = studypipe_cmd(&base)
        .args(["summarize", "--file", page.to_str().unwrap()])
        .output()
        .await
        .expect("run studypipe summarize");

    assert!(
        out.status.success(),
        "summarize failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.contains(SUMMARY_TEXT));
    assert!(s.contains("Key concepts:"));
    assert!(s.contains("- photosynthesis"));
}

#[tokio::test]
async fn quiz_json_returns_four_questions() {
    let base = spawn_stub().await;
    let tmp = tempfile::tempdir().unwrap();
    let page = write_page(&tmp);

    let out = studypipe_cmd(&base)
        .args(["quiz", "--file", page.to_str().unwrap(), "--output", "json"])
        .output()
        .await
        .expect("run studypipe quiz");

    assert!(
        out.status.success(),
        "quiz failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse quiz json");

    assert_eq!(v["kind"].as_str(), Some("quiz"));
    assert_eq!(v["ok"].as_bool(), Some(true));
    let questions = v["quiz"]["questions"].as_array().expect("questions");
    assert_eq!(questions.len(), 4);
    for q in questions {
        assert_eq!(q["options"].as_array().map(|o| o.len()), Some(4));
        assert!(q["answer"].as_u64().unwrap_or(99) <= 3);
    }
    assert_eq!(
        questions[0]["q"].as_str(),
        Some("What does photosynthesis convert?")
    );
}

#[tokio::test]
async fn quiz_text_output_renders_lettered_options() {
    let base = spawn_stub().await;
    let tmp = tempfile::tempdir().unwrap();
    let page = write_page(&tmp);

    let out = studypipe_cmd(&base)
        .args(["quiz", "--file", page.to_str().unwrap()])
        .output()
        .await
        .expect("run studypipe quiz");

    assert!(
        out.status.success(),
        "quiz failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.contains("1. What does photosynthesis convert?"));
    assert!(s.contains("   B. Chlorophyll"));
    assert!(s.contains("   Answer: D"));
}

#[tokio::test]
async fn explain_json_round_trip() {
    let base = spawn_stub().await;
    let tmp = tempfile::tempdir().unwrap();
    let page = write_page(&tmp);

    let out = studypipe_cmd(&base)
        .args([
            "explain",
            "--term",
            "chlorophyll",
            "--file",
            page.to_str().unwrap(),
            "--output",
            "json",
        ])
        .output()
        .await
        .expect("run studypipe explain");

    assert!(
        out.status.success(),
        "explain failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("parse explain json");
    assert_eq!(v["kind"].as_str(), Some("explain"));
    assert_eq!(v["term"].as_str(), Some("chlorophyll"));
    assert!(!v["explanation"].as_str().unwrap_or("").is_empty());
}

#[tokio::test]
async fn summarize_without_model_config_fails_with_hint() {
    let tmp = tempfile::tempdir().unwrap();
    let page = write_page(&tmp);

    let bin = assert_cmd::cargo::cargo_bin!("studypipe");
    let out = tokio::process::Command::new(bin)
        .args(["summarize", "--file", page.to_str().unwrap()])
        .env_remove("STUDYPIPE_ENV_FILE")
        .env_remove("STUDYPIPE_MODEL_PROVIDER")
        .env_remove("STUDYPIPE_OPENAI_COMPAT_BASE_URL")
        .env_remove("STUDYPIPE_OPENAI_COMPAT_MODEL")
        .env_remove("STUDYPIPE_OLLAMA_ENABLE")
        .output()
        .await
        .expect("run studypipe summarize");

    assert!(!out.status.success());
    let s = String::from_utf8_lossy(&out.stderr);
    assert!(s.contains("not configured"));
    assert!(s.contains("STUDYPIPE_OLLAMA_ENABLE"));
}
