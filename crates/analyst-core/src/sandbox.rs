//! Sandboxed execution of validated analysis scripts.
//!
//! Each execution gets a private working directory under the run directory
//! holding the copied dataset, the assembled `harness.py`, and whatever the
//! script writes. Directories are left in place for inspection.

use crate::artifact::collect_artifacts;
use crate::config::SandboxConfig;
use crate::harness::assemble_harness;
use crate::io::safe_file_name;
use crate::paths::{task_work_dir, HARNESS_FILE, INSIGHTS_FILE};
use crate::types::{TaskResult, CANCELLED_MESSAGE};
use crate::validate::{validate_syntax_only, ValidationError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Environment variable naming the preferred interpreter.
pub const PYTHON_ENV: &str = "ANALYST_PYTHON";

/// Placed between captured stdout and stderr in `TaskResult::stdout`.
pub const STDERR_SEPARATOR: &str = "\n--- stderr ---\n";
const FALLBACK_DATASET_NAME: &str = "dataset.csv";

/// Why an execution did not succeed. Rendered into
/// `TaskResult::error_message`; never propagated to the orchestrator.
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    #[error("no python interpreter could be started (tried: {})", .tried.join(", "))]
    InterpreterNotFound { tried: Vec<String> },

    #[error("could not prepare working directory {}: {source}", .path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("assembled harness is invalid: {0}")]
    HarnessInvalid(ValidationError),

    #[error("execution timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("script exited with status {code}: {detail}")]
    NonZeroExit { code: i32, detail: String },

    #[error("{}", CANCELLED_MESSAGE)]
    Cancelled,

    #[error("i/o error while running script: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw output of a process that started.
#[derive(Debug)]
struct ProcessOutput {
    interpreter: String,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl ProcessOutput {
    fn combined(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            format!("{}{STDERR_SEPARATOR}{}", self.stdout, self.stderr)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    interpreters: Vec<String>,
    timeout: Duration,
    inline_image_limit: u64,
}

impl ExecutionEngine {
    /// Interpreters in preference order: configured entries, then
    /// `$ANALYST_PYTHON`, then `python3` from `PATH`, then the bare
    /// `python3` and `python` names.
    pub fn new(config: &SandboxConfig) -> Self {
        let mut candidates: Vec<String> = config.interpreters.clone();
        if let Ok(env) = std::env::var(PYTHON_ENV) {
            if !env.trim().is_empty() {
                candidates.push(env);
            }
        }
        if let Ok(path) = which::which("python3") {
            candidates.push(path.to_string_lossy().into_owned());
        }
        candidates.push("python3".into());
        candidates.push("python".into());
        Self::with_interpreters(candidates, config)
    }

    /// Use exactly `interpreters` (deduplicated, order kept).
    pub fn with_interpreters(interpreters: Vec<String>, config: &SandboxConfig) -> Self {
        let mut seen = std::collections::HashSet::new();
        let interpreters = interpreters
            .into_iter()
            .filter(|i| seen.insert(i.clone()))
            .collect();
        Self {
            interpreters,
            timeout: Duration::from_secs(config.timeout_secs),
            inline_image_limit: config.inline_image_limit_bytes,
        }
    }

    pub fn interpreters(&self) -> &[String] {
        &self.interpreters
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `code` against `dataset` in a fresh directory under `run_dir`.
    ///
    /// Always returns a result. Success means the interpreter exited 0.
    /// Artifacts and insights are collected on failure too.
    pub async fn execute(
        &self,
        task_id: &str,
        code: &str,
        dataset: &[u8],
        filename: &str,
        run_dir: &Path,
        cancel: &CancellationToken,
    ) -> TaskResult {
        let started = Instant::now();
        let dataset_name = safe_file_name(filename).unwrap_or_else(|| FALLBACK_DATASET_NAME.into());

        let work_dir = match prepare_work_dir(run_dir, task_id, code, dataset, &dataset_name) {
            Ok(dir) => dir,
            Err(failure) => {
                warn!(task_id, error = %failure, "execution setup failed");
                let mut result = TaskResult::failed(task_id, failure.to_string());
                result.duration_ms = elapsed_ms(started);
                return result;
            }
        };

        let outcome = self.launch(&work_dir, cancel).await;

        let exclude = [HARNESS_FILE, INSIGHTS_FILE, dataset_name.as_str()];
        let artifacts = collect_artifacts(&work_dir, &exclude, self.inline_image_limit)
            .unwrap_or_else(|e| {
                warn!(task_id, error = %e, "artifact scan failed");
                Vec::new()
            });
        let insight = read_insight(&work_dir);

        let mut result = TaskResult::failed(task_id, "");
        result.artifacts = artifacts;
        result.insight = insight;
        result.work_dir = Some(work_dir);

        match outcome {
            Ok(output) if output.exit_code == Some(0) => {
                info!(task_id, interpreter = %output.interpreter, "script succeeded");
                result.success = true;
                result.error_message = None;
                result.stdout = output.combined();
            }
            Ok(output) => {
                let failure = ExecutionFailure::NonZeroExit {
                    code: output.exit_code.unwrap_or(-1),
                    detail: error_detail(&output.stderr),
                };
                info!(task_id, error = %failure, "script failed");
                result.error_message = Some(failure.to_string());
                result.stdout = output.combined();
            }
            Err(failure) => {
                warn!(task_id, error = %failure, "script did not complete");
                result.error_message = Some(failure.to_string());
            }
        }
        result.duration_ms = elapsed_ms(started);
        result
    }

    /// Start the harness with the first interpreter that launches. A
    /// process that starts is never retried with another interpreter.
    async fn launch(
        &self,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ExecutionFailure> {
        if cancel.is_cancelled() {
            return Err(ExecutionFailure::Cancelled);
        }

        let mut tried = Vec::new();
        for interpreter in &self.interpreters {
            let spawned = Command::new(interpreter)
                .arg(HARNESS_FILE)
                .current_dir(work_dir)
                .env("MPLBACKEND", "Agg")
                .env("PYTHONDONTWRITEBYTECODE", "1")
                .env("PYTHONIOENCODING", "utf-8")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn();
            let child = match spawned {
                Ok(child) => child,
                Err(e) => {
                    debug!(interpreter = %interpreter, error = %e, "interpreter failed to start");
                    tried.push(interpreter.clone());
                    continue;
                }
            };
            debug!(interpreter = %interpreter, dir = %work_dir.display(), "script started");

            // Dropping the wait future drops the child, which kills it.
            let output = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ExecutionFailure::Cancelled),
                waited = tokio::time::timeout(self.timeout, child.wait_with_output()) => match waited {
                    Ok(output) => output?,
                    Err(_) => {
                        return Err(ExecutionFailure::TimedOut {
                            secs: self.timeout.as_secs(),
                        })
                    }
                },
            };
            return Ok(ProcessOutput {
                interpreter: interpreter.clone(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Err(ExecutionFailure::InterpreterNotFound { tried })
    }
}

/// Create `<task_id>_<stamp>` (suffixed if taken), copy the dataset, and
/// write the syntax-checked harness.
fn prepare_work_dir(
    run_dir: &Path,
    task_id: &str,
    code: &str,
    dataset: &[u8],
    dataset_name: &str,
) -> Result<PathBuf, ExecutionFailure> {
    let work_dir_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ExecutionFailure::WorkDir { path, source }
    };

    std::fs::create_dir_all(run_dir).map_err(work_dir_err(run_dir))?;
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f").to_string();
    let base = task_work_dir(run_dir, task_id, &stamp);
    let mut dir = base.clone();
    let mut n = 1;
    loop {
        match std::fs::create_dir(&dir) {
            Ok(()) => break,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && n < 100 => {
                dir = PathBuf::from(format!("{}_{n}", base.display()));
                n += 1;
            }
            Err(e) => return Err(work_dir_err(&dir)(e)),
        }
    }

    std::fs::write(dir.join(dataset_name), dataset).map_err(work_dir_err(&dir))?;

    let script = assemble_harness(code, dataset_name);
    validate_syntax_only(&script).map_err(ExecutionFailure::HarnessInvalid)?;
    std::fs::write(dir.join(HARNESS_FILE), script).map_err(work_dir_err(&dir))?;
    Ok(dir)
}

/// The harness's `ERROR:` line, else the last non-empty stderr line.
fn error_detail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .find_map(|l| l.strip_prefix("ERROR: "))
        .or_else(|| lines.last().copied())
        .unwrap_or("no error output")
        .to_string()
}

fn read_insight(work_dir: &Path) -> Option<serde_json::Value> {
    let raw = std::fs::read_to_string(work_dir.join(INSIGHTS_FILE)).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(dir = %work_dir.display(), error = %e, "ignoring unreadable insights file");
            None
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
