#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn analyst(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("analyst").unwrap();
    cmd.current_dir(dir.path())
        .env("ANALYST_ROOT", dir.path())
        .env_remove("ANALYST_CONFIG")
        .env_remove("ANALYST_PYTHON");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn churn_csv(dir: &TempDir) -> std::path::PathBuf {
    let mut csv = String::from("customer_id,tenure,monthly_charges,churn\n");
    for i in 0..40 {
        csv.push_str(&format!(
            "{i},{},{}.5,{}\n",
            i % 24 + 1,
            20 + i,
            if i % 3 == 0 { "yes" } else { "no" }
        ));
    }
    write(dir, "customers.csv", &csv)
}

// ---------------------------------------------------------------------------
// analyst tasks
// ---------------------------------------------------------------------------

#[test]
fn tasks_lists_builtin_catalog() {
    let dir = TempDir::new().unwrap();
    analyst(&dir)
        .arg("tasks")
        .assert()
        .success()
        .stdout(predicate::str::contains("data_profiling"))
        .stdout(predicate::str::contains("churn_prediction"))
        .stdout(predicate::str::contains("DEPENDS ON"));
}

#[test]
fn tasks_json_has_ten_entries() {
    let dir = TempDir::new().unwrap();
    let output = analyst(&dir).args(["tasks", "--json"]).output().unwrap();
    assert!(output.status.success());

    let tasks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let tasks = tasks.as_array().unwrap();
    assert_eq!(tasks.len(), 10);
    assert!(tasks.iter().all(|t| t["id"].is_string()));
}

#[test]
fn tasks_include_config_overrides() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".analyst")).unwrap();
    write(
        &dir,
        ".analyst/config.yaml",
        "tasks:\n  - id: basket_analysis\n    display_name: Basket Analysis\n    description: Products bought together\n",
    );

    let output = analyst(&dir).args(["tasks", "--json"]).output().unwrap();
    let tasks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(tasks.as_array().unwrap().len(), 11);
}

// ---------------------------------------------------------------------------
// analyst check
// ---------------------------------------------------------------------------

#[test]
fn check_accepts_plain_analysis() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "ok.py",
        "summary = df.describe()\nprint(summary)\ninsights = {\"rows\": len(df)}\n",
    );
    analyst(&dir)
        .arg("check")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("OK"));
}

#[test]
fn check_rejects_eval() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "bad.py", "x = eval(\"1 + 1\")\nprint(x)\n");
    analyst(&dir)
        .arg("check")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("rejected"))
        .stderr(predicate::str::contains("eval"));
}

#[test]
fn check_json_reports_syntax_error() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "broken.py", "def f(:\n    pass\n");
    let output = analyst(&dir)
        .args(["check", "--json"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["valid"], false);
    assert_eq!(v["error"]["kind"], "syntax");
}

// ---------------------------------------------------------------------------
// analyst config
// ---------------------------------------------------------------------------

#[test]
fn config_init_writes_default_file_once() {
    let dir = TempDir::new().unwrap();
    analyst(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    assert!(dir.path().join(".analyst/config.yaml").exists());

    analyst(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn config_validate_default_is_clean() {
    let dir = TempDir::new().unwrap();
    analyst(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_fails_on_errors() {
    let dir = TempDir::new().unwrap();
    let cfg = write(&dir, "strict.yaml", "sandbox:\n  timeout_secs: 0\n");
    analyst(&dir)
        .args(["config", "validate", "--config"])
        .arg(&cfg)
        .assert()
        .failure()
        .stdout(predicate::str::contains("sandbox.timeout_secs is 0"));
}

#[test]
fn config_show_json_reflects_file() {
    let dir = TempDir::new().unwrap();
    let cfg = write(&dir, "custom.yaml", "sandbox:\n  timeout_secs: 42\n");
    let output = analyst(&dir)
        .args(["config", "show", "--json", "--config"])
        .arg(&cfg)
        .output()
        .unwrap();
    assert!(output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["sandbox"]["timeout_secs"], 42);
    assert_eq!(v["resilience"]["retry"]["max_attempts"], 3);
}

#[test]
fn explicit_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    analyst(&dir)
        .args(["tasks", "--config", "nope.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

// ---------------------------------------------------------------------------
// analyst run
// ---------------------------------------------------------------------------

#[test]
fn run_missing_dataset_fails() {
    let dir = TempDir::new().unwrap();
    analyst(&dir)
        .args(["run", "missing.csv", "-q", "why?", "--offline"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to read dataset"));
}

#[test]
fn run_unsupported_file_type_fails() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "data.xyz", "a,b\n1,2\n");
    analyst(&dir)
        .args(["run", "-q", "summarise", "--offline"])
        .arg(&file)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unsupported dataset file type"));
}

#[test]
fn run_offline_writes_report() {
    let dir = TempDir::new().unwrap();
    let data = churn_csv(&dir);
    let output = analyst(&dir)
        .args(["run", "--json", "--offline", "-q", "which customers will churn?"])
        .arg(&data)
        .output()
        .unwrap();

    // Without python every task fails and the exit code says so; the run
    // itself still completes and writes its report.
    let code = output.status.code().unwrap();
    assert!(code == 0 || code == 2, "unexpected exit code {code}");

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["success"], true);
    assert_eq!(summary["selection_method"], "local");
    let tasks = summary["tasks"].as_array().unwrap();
    assert!(tasks.iter().any(|t| t["task_id"] == "churn_prediction"));

    let report_path = summary["report"].as_str().unwrap();
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(report["run_id"], summary["run_id"]);
    assert_eq!(report["dataset"]["rows"], 40);
    assert!(report_path.contains(".analyst"));

    // Progress events go to stderr as JSON lines.
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr
        .lines()
        .any(|l| l.contains("\"kind\":\"workflow_completed\"")));
}
