use std::process::Command;

fn fixture_path() -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    format!("{manifest_dir}/tests/fixtures/sample-go-project/")
}

fn codemeter_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_codemeter"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_analyze_sample_project() {
    let output = codemeter_cmd()
        .args(["analyze", &fixture_path()])
        .output()
        .expect("failed to run codemeter analyze");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "codemeter analyze failed: stdout={stdout}, stderr={stderr}"
    );
    assert!(
        stdout.contains("Code Metrics Report"),
        "should contain header: {stdout}"
    );
    assert!(
        stdout.contains("COMPLETED"),
        "should report completion: {stdout}"
    );
    assert!(
        stdout.contains("Files processed: 3/3"),
        "vendor and non-source files should be skipped: {stdout}"
    );
    assert!(
        stdout.contains("internal/store/store.go"),
        "should list complex files: {stdout}"
    );
}

#[test]
fn test_analyze_json_output() {
    let output = codemeter_cmd()
        .args(["analyze", &fixture_path(), "--format", "json"])
        .output()
        .expect("failed to run codemeter analyze");

    assert!(output.status.success(), "analyze --format json should succeed");

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON");

    assert_eq!(value["job"]["status"], "COMPLETED");
    assert_eq!(value["job"]["total_files"], 3);
    assert_eq!(value["summary"]["total_files"], 3);
    assert_eq!(value["summary"]["error_count"], 0);
    assert_eq!(value["summary"]["language_distribution"]["go"], 3);

    let files = value["files"].as_array().expect("files should be an array");
    assert!(files
        .iter()
        .all(|f| !f["file_path"].as_str().unwrap().starts_with("vendor/")));

    // main.go: 2, store.go: New + 3 methods, store_test.go: 2
    assert_eq!(value["summary"]["quality"]["total_functions"], 8);
    assert_eq!(value["summary"]["quality"]["total_classes"], 2);
}

#[test]
fn test_analyze_with_explicit_config() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config_path = dir.path().join("custom.toml");
    std::fs::write(
        &config_path,
        "[service]\nworker_pool_size = 1\n\n[logging]\nlevel = \"error\"\n",
    )
    .unwrap();

    let output = codemeter_cmd()
        .args([
            "analyze",
            &fixture_path(),
            "--config",
            config_path.to_str().unwrap(),
        ])
        .output()
        .expect("failed to run codemeter analyze");

    assert!(output.status.success(), "analyze with config should succeed");
    assert!(
        output.stderr.is_empty(),
        "error level should silence logs: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_analyze_missing_path() {
    let output = codemeter_cmd()
        .args(["analyze", "/definitely/not/here"])
        .output()
        .expect("failed to run codemeter analyze");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "should print error: {stderr}");
}

#[test]
fn test_analyze_invalid_config() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config_path = dir.path().join("bad.toml");
    std::fs::write(&config_path, "[metrics]\ncomplexity_threshold = \"high\"\n").unwrap();

    let output = codemeter_cmd()
        .args([
            "analyze",
            &fixture_path(),
            "--config",
            config_path.to_str().unwrap(),
        ])
        .output()
        .expect("failed to run codemeter analyze");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_detect_language() {
    let output = codemeter_cmd()
        .args(["detect", &format!("{}main.go", fixture_path())])
        .output()
        .expect("failed to run codemeter detect");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "go");
}

#[test]
fn test_detect_unknown_file() {
    let output = codemeter_cmd()
        .args(["detect", &format!("{}README.md", fixture_path())])
        .output()
        .expect("failed to run codemeter detect");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "unknown");
}

#[test]
fn test_init_creates_config() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let output = codemeter_cmd()
        .args(["init"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run codemeter init");

    assert!(output.status.success(), "init should succeed");

    let config_path = dir.path().join(".codemeter.toml");
    assert!(config_path.exists(), ".codemeter.toml should be created");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[service]"), "should contain [service]");
    assert!(content.contains("[metrics]"), "should contain [metrics]");
    assert!(content.contains("[logging]"), "should contain [logging]");
}

#[test]
fn test_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    std::fs::write(dir.path().join(".codemeter.toml"), "# mine\n").unwrap();

    let output = codemeter_cmd()
        .args(["init"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run codemeter init");
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(
        std::fs::read_to_string(dir.path().join(".codemeter.toml")).unwrap(),
        "# mine\n"
    );

    let forced = codemeter_cmd()
        .args(["init", "--force"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run codemeter init --force");
    assert!(forced.status.success());
}
