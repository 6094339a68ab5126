use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const CONFIG: &str = r#"
[data]
persist_dir = "store"

[embedding]
provider = "hash"
dimension = 64

[[domains]]
name = "riddles"
corpus = "riddles.json"
schema = { kind = "question_answer", question_label = "问题", answer_label = "回答" }

[[domains]]
name = "empty"
corpus = "empty.json"
schema = { kind = "attributes" }
"#;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.toml"), CONFIG).unwrap();
    fs::write(dir.path().join("riddles.json"), r#"[{"instruction": "What flies without wings?", "output": "Time"}]"#).unwrap();
    fs::write(dir.path().join("empty.json"), "[]").unwrap();
    dir
}

fn lore(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lore"))
        .arg("--config")
        .arg(dir.join("config.toml"))
        .args(args)
        .env("RUST_LOG", "warn")
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

#[test]
fn query_on_a_ready_domain_prints_json_hits() {
    let dir = workspace();
    let out = lore(dir.path(), &["query", "riddles", "flies without wings", "--json"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\"riddles_0\""), "stdout: {stdout}");
    assert!(stdout.contains("回答: Time"), "stdout: {stdout}");
}

#[test]
fn query_on_a_failed_domain_reports_not_initialized() {
    let dir = workspace();
    let out = lore(dir.path(), &["query", "empty", "anything"]);
    assert!(!out.status.success());

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Index for domain 'empty' is not initialized"), "stderr: {stderr}");
    // The build failure itself is still logged.
    assert!(stderr.contains("produced no documents"), "stderr: {stderr}");
}

#[test]
fn init_reports_each_domain() {
    let dir = workspace();
    let out = lore(dir.path(), &["init"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("riddles") && stdout.contains("built"), "stdout: {stdout}");
    assert!(stdout.contains("empty"), "stdout: {stdout}");
}
