use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const ANALYST_DIR: &str = ".analyst";
pub const CONFIG_FILE: &str = ".analyst/config.yaml";
pub const RUNS_DIR: &str = ".analyst/runs";

pub const REPORT_FILE: &str = "report.json";
pub const HARNESS_FILE: &str = "harness.py";
pub const INSIGHTS_FILE: &str = "_insights.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn analyst_dir(root: &Path) -> PathBuf {
    root.join(ANALYST_DIR)
}

/// Resolve a configured directory against the project root. Absolute paths
/// are kept as they are.
pub fn resolve_under(root: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        root.join(dir)
    }
}

pub fn run_dir(work_dir: &Path, run_id: &str) -> PathBuf {
    work_dir.join(run_id)
}

pub fn report_path(run_dir: &Path) -> PathBuf {
    run_dir.join(REPORT_FILE)
}

/// Private working directory for one task execution: `<task_id>_<stamp>`.
pub fn task_work_dir(run_dir: &Path, task_id: &str, stamp: &str) -> PathBuf {
    run_dir.join(format!("{task_id}_{stamp}"))
}

// ---------------------------------------------------------------------------
// Task id validation
// ---------------------------------------------------------------------------

static TASK_ID_RE: OnceLock<Regex> = OnceLock::new();

fn task_id_re() -> &'static Regex {
    TASK_ID_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_]*$").unwrap())
}

/// Task ids become directory names, so they are restricted to lowercase
/// alphanumerics and underscores.
pub fn is_valid_task_id(id: &str) -> bool {
    id.len() <= 64 && task_id_re().is_match(id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
