use assert_cmd::Command;
use serde_json::Value;
use std::path::Path;

fn graphqa() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_graphqa"));
    for key in [
        "GRAPHQA_DB",
        "GRAPHQA_LLM_PROVIDER",
        "GRAPHQA_WRITE_POLICY",
        "OPENAI_API_KEY",
        "GRAPHQA_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

const SEED: &str = r#"{
  "nodes": [
    {"key": "c1", "labels": ["Contract"], "properties": {"name": "NDA"}},
    {"key": "k1", "labels": ["Clause"], "properties": {"title": "Term"}}
  ],
  "relationships": [
    {"from": "c1", "to": "k1", "type": "HAS_CLAUSE", "properties": {"position": 1}}
  ]
}"#;

fn seeded_db(dir: &Path) -> String {
    let db = dir.join("graph.db");
    let seed = dir.join("seed.json");
    std::fs::write(&seed, SEED).expect("write seed");
    graphqa()
        .args(["--db", db.to_str().unwrap(), "seed", seed.to_str().unwrap()])
        .assert()
        .success();
    db.to_str().unwrap().to_string()
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("json output")
}

#[test]
fn test_cli_exits_with_success_on_help() {
    graphqa().arg("--help").assert().success();
}

#[test]
fn test_cli_status_on_memory_graph() {
    let output = graphqa().arg("status").assert().success().get_output().stdout.clone();
    let status = stdout_json(&output);
    assert_eq!(status["nodes"], 0);
    assert_eq!(status["relationships"], 0);
}

#[test]
fn test_cli_seed_then_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = seeded_db(dir.path());
    let output = graphqa()
        .args(["--db", &db, "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let status = stdout_json(&output);
    assert_eq!(status["nodes"], 2);
    assert_eq!(status["relationships"], 1);
}

#[test]
fn test_cli_query_prints_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = seeded_db(dir.path());
    let output = graphqa()
        .args([
            "--db",
            &db,
            "query",
            "MATCH (c:Contract)-[:HAS_CLAUSE]->(k) RETURN c.name AS contract, k.title AS clause",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let result = stdout_json(&output);
    assert_eq!(result["columns"], serde_json::json!(["contract", "clause"]));
    assert_eq!(result["rows"], serde_json::json!([["NDA", "Term"]]));
}

#[test]
fn test_cli_query_rejects_unknown_label() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = seeded_db(dir.path());
    graphqa()
        .args(["--db", &db, "query", "MATCH (p:Person) RETURN p"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("unknown label `Person`"));
}

#[test]
fn test_cli_schema_prints_prompt_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = seeded_db(dir.path());
    graphqa()
        .args(["--db", &db, "schema"])
        .assert()
        .success()
        .stdout(predicates::str::contains("(:Contract)-[:HAS_CLAUSE]->(:Clause)"));
}

#[test]
fn test_cli_ask_empty_question_fails() {
    graphqa()
        .env("GRAPHQA_LLM_PROVIDER", "ollama")
        .args(["ask", ""])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("SynthesisFailed"));
}

#[test]
fn test_cli_ask_without_api_key_is_config_error() {
    graphqa().args(["ask", "Who signed?"]).assert().code(2);
}

#[test]
fn test_cli_invalid_config_exits_2() {
    graphqa()
        .env("GRAPHQA_WRITE_POLICY", "sometimes")
        .arg("status")
        .assert()
        .code(2);
}

#[test]
fn test_cli_reads_dotenv_from_working_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(".env"), "GRAPHQA_WRITE_POLICY=sometimes\n").expect("write .env");
    graphqa()
        .current_dir(dir.path())
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicates::str::contains("GRAPHQA_WRITE_POLICY"));
}

#[test]
fn test_cli_process_env_overrides_dotenv() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(".env"), "GRAPHQA_WRITE_POLICY=sometimes\n").expect("write .env");
    graphqa()
        .current_dir(dir.path())
        .env("GRAPHQA_WRITE_POLICY", "reject")
        .arg("status")
        .assert()
        .success();
}
