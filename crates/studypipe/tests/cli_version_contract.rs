#[test]
fn studypipe_version_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("studypipe");
    let out = std::process::Command::new(bin)
        .args(["version"])
        // Disable env-file autoload so this contract stays hermetic.
        .env_remove("STUDYPIPE_ENV_FILE")
        .output()
        .expect("run studypipe version");

    assert!(out.status.success(), "studypipe version failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse version json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("version"));
    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["name"].as_str(), Some("studypipe"));
    assert!(!v["version"].as_str().unwrap_or("").is_empty());
}

#[test]
fn studypipe_version_text_output_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("studypipe");
    let out = std::process::Command::new(bin)
        .args(["version", "--output", "text"])
        .env_remove("STUDYPIPE_ENV_FILE")
        .output()
        .expect("run studypipe version --output text");

    assert!(out.status.success(), "studypipe version failed");
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(
        s.trim_start().starts_with("studypipe "),
        "expected text output to start with `studypipe `"
    );
}
