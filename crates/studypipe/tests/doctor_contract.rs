fn hermetic(cmd: &mut std::process::Command) -> &mut std::process::Command {
    // Ensure we don't accidentally inherit model config from the environment.
    cmd.env_remove("STUDYPIPE_ENV_FILE")
        .env_remove("STUDYPIPE_MODEL_PROVIDER")
        .env_remove("STUDYPIPE_OPENAI_COMPAT_BASE_URL")
        .env_remove("STUDYPIPE_OPENAI_COMPAT_MODEL")
        .env_remove("STUDYPIPE_OPENAI_COMPAT_API_KEY")
        .env_remove("STUDYPIPE_OLLAMA_ENABLE")
        .env_remove("STUDYPIPE_OLLAMA_BASE_URL")
        .env_remove("STUDYPIPE_OLLAMA_MODEL")
        .env_remove("STUDYPIPE_FETCH_MAX_BYTES")
}

#[test]
fn studypipe_doctor_contract_json_and_bool_flags() {
    let bin = assert_cmd::cargo::cargo_bin!("studypipe");
    let mut cmd = std::process::Command::new(bin);
    let out = hermetic(cmd.args(["doctor"]))
        .output()
        .expect("run studypipe doctor");

    assert!(out.status.success(), "studypipe doctor failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse doctor json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("doctor"));
    assert_eq!(v["name"].as_str(), Some("studypipe"));
    assert!(!v["version"].as_str().unwrap_or("").is_empty());
    assert!(v.get("elapsed_ms").is_some());
    assert!(!v["platform"]["os"].as_str().unwrap_or("").is_empty());

    // Config surface should be present and booleans-only for anything secret.
    assert!(v["configured"]["model"]["openai_compat"].is_boolean());
    assert!(v["configured"]["model"]["ollama"].is_boolean());
    assert_eq!(
        v["configured"]["model"]["openai_compat"].as_bool(),
        Some(false)
    );
    assert_eq!(v["configured"]["model"]["ollama"].as_bool(), Some(false));
    assert_eq!(v["configured"]["model"]["selected"].as_str(), Some("none"));
    assert_eq!(
        v["configured"]["fetch"]["max_bytes"].as_u64(),
        Some(5_000_000)
    );
    // The raw key must never leak into the payload.
    assert!(s.find("API_KEY").is_none());
}

#[test]
fn studypipe_doctor_reports_configured_providers() {
    let bin = assert_cmd::cargo::cargo_bin!("studypipe");
    let mut cmd = std::process::Command::new(bin);
    let out = hermetic(cmd.args(["doctor"]))
        .env("STUDYPIPE_OLLAMA_ENABLE", "true")
        .env("STUDYPIPE_FETCH_MAX_BYTES", "1234")
        .output()
        .expect("run studypipe doctor");

    assert!(out.status.success(), "studypipe doctor failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse doctor json");

    assert_eq!(v["configured"]["model"]["ollama"].as_bool(), Some(true));
    assert_eq!(
        v["configured"]["model"]["selected"].as_str(),
        Some("ollama")
    );
    assert_eq!(v["configured"]["fetch"]["max_bytes"].as_u64(), Some(1234));
}

#[test]
fn studypipe_doctor_text_output_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("studypipe");
    let mut cmd = std::process::Command::new(bin);
    let out = hermetic(cmd.args(["doctor", "--output", "text"]))
        .output()
        .expect("run studypipe doctor --output text");

    assert!(out.status.success(), "studypipe doctor failed");
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(
        s.contains("studypipe "),
        "expected doctor text output to mention studypipe"
    );
    assert!(s.contains("model provider:"), "expected provider summary");
}
