//! The analysis run state machine.
//!
//! ```text
//! Ingest ──► Select ──► Execute (one task at a time) ──► Report
//!   │
//!   └─ digest failure ends the run with an error
//! ```
//!
//! Each stage takes the [`WorkflowState`] by value and hands it on. Task
//! failures are recorded and the run always reaches `Report` once the
//! digest exists.

use super::events::{task_percent, ProgressEmitter, ProgressEvent, ProgressKind, EVENT_BUFFER};
use super::state::{Stage, WorkflowState};
use crate::catalog::TaskCatalog;
use crate::config::{AnalystConfig, SelectionConfig};
use crate::digest::{DigestProvider, TabularDigester};
use crate::error::{AnalystError, Result};
use crate::paths::run_dir;
use crate::prompt::{prior_excerpts, truncate_chars, EXCERPT_CHARS};
use crate::report::AnalysisReport;
use crate::resolver::resolve_order;
use crate::sandbox::{ExecutionEngine, STDERR_SEPARATOR};
use crate::sanitize::sanitize;
use crate::selector::select_tasks;
use crate::types::{AnalysisRequest, TaskDescriptor, TaskResult};
use crate::validate::validate_with_repair;
use analyst_codegen::{parse_generated_code, Gateway, GeneratedCode};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Rate-limit identity used when none is configured.
pub const DEFAULT_IDENTITY: &str = "analyst";

pub struct Orchestrator {
    catalog: TaskCatalog,
    selection: SelectionConfig,
    gateway: Option<Gateway>,
    engine: ExecutionEngine,
    digester: Box<dyn DigestProvider>,
    work_dir: PathBuf,
    identity: String,
    events: broadcast::Sender<ProgressEvent>,
}

impl Orchestrator {
    /// Build from config. Runs are written under `config.sandbox.work_dir`
    /// resolved against `root`. Without a gateway, selection is local and
    /// every task runs the built-in summary script.
    pub fn new(config: &AnalystConfig, root: &Path, gateway: Option<Gateway>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            catalog: config.catalog(),
            selection: config.selection.clone(),
            gateway,
            engine: ExecutionEngine::new(&config.sandbox),
            digester: Box::new(TabularDigester),
            work_dir: config.work_dir(root),
            identity: DEFAULT_IDENTITY.to_string(),
            events,
        }
    }

    pub fn with_digester(mut self, digester: Box<dyn DigestProvider>) -> Self {
        self.digester = digester;
        self
    }

    pub fn with_engine(mut self, engine: ExecutionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Caller identity for the service rate limiter.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Progress events for every run started after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Run the whole pipeline for one request.
    ///
    /// Returns `Err` only when the dataset cannot be digested. Everything
    /// else, cancellation included, ends in a report.
    pub async fn run(&self, request: AnalysisRequest, cancel: CancellationToken) -> Result<AnalysisReport> {
        let run_id = new_run_id();
        let run_dir = run_dir(&self.work_dir, &run_id);
        let mut progress = ProgressEmitter::new(&self.events, run_id.clone());
        info!(run_id = %run_id, file = %request.filename, "analysis run started");

        let state = self.ingest(&request, run_id, &mut progress)?;
        let state = self.select(state, &cancel, &mut progress).await;
        let state = self.execute(state, &request, &run_dir, &cancel, &mut progress).await;
        Ok(self.report(state, &run_dir, &mut progress))
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    fn ingest(
        &self,
        request: &AnalysisRequest,
        run_id: String,
        progress: &mut ProgressEmitter<'_>,
    ) -> Result<WorkflowState> {
        let stage = Stage::Ingest;
        progress.emit(progress.event(ProgressKind::StageStarted, stage, stage.start_percent()));

        match self.digester.compute(&request.dataset, &request.filename) {
            Ok(digest) => {
                info!(
                    rows = digest.row_count,
                    columns = digest.column_count(),
                    "dataset digested"
                );
                let mut state = WorkflowState::new(run_id, request.question.clone(), digest);
                state.complete_stage(stage);
                Ok(state)
            }
            Err(e) => {
                warn!(error = %e, "ingest failed, ending run");
                progress.emit(
                    progress
                        .event(ProgressKind::StageError, stage, progress.last_percent())
                        .with_message(e.to_string()),
                );
                Err(e)
            }
        }
    }

    async fn select(
        &self,
        mut state: WorkflowState,
        cancel: &CancellationToken,
        progress: &mut ProgressEmitter<'_>,
    ) -> WorkflowState {
        let stage = Stage::Select;
        progress.emit(progress.event(ProgressKind::StageStarted, stage, stage.start_percent()));

        // A cancelled run still gets a selection so every task can be
        // reported, but does not spend a service call on it.
        let gateway = self.gateway.as_ref().filter(|_| !cancel.is_cancelled());
        let selection = select_tasks(
            gateway,
            &self.identity,
            &self.catalog,
            &state.digest,
            &state.question,
            &self.selection,
        )
        .await;

        let deps = self.catalog.dependency_map(&selection.task_ids);
        let resolution = resolve_order(&selection.task_ids, &deps);

        // Fallback notes land in the report's errors, never in `stage_error`.
        for note in selection.warnings.iter().chain(&resolution.warnings) {
            warn!(stage = %stage.as_str(), "{note}");
        }
        state.errors.extend(selection.warnings);
        state.errors.extend(resolution.warnings);
        state.selection_method = Some(selection.method);
        state.selected_task_ids = resolution.order;
        info!(
            method = %selection.method,
            tasks = %state.selected_task_ids.join(","),
            "execution order resolved"
        );
        state.complete_stage(stage);
        state
    }

    async fn execute(
        &self,
        mut state: WorkflowState,
        request: &AnalysisRequest,
        run_dir: &Path,
        cancel: &CancellationToken,
        progress: &mut ProgressEmitter<'_>,
    ) -> WorkflowState {
        let stage = Stage::Execute;
        progress.emit(progress.event(ProgressKind::StageStarted, stage, stage.start_percent()));

        let order = state.selected_task_ids.clone();
        let total = order.len();
        for (i, task_id) in order.iter().enumerate() {
            progress.emit(
                progress
                    .event(ProgressKind::TaskStarted, stage, task_percent(i, total))
                    .with_task(task_id.as_str()),
            );

            let mut result = if cancel.is_cancelled() {
                TaskResult::cancelled(task_id.as_str())
            } else {
                match self.catalog.get(task_id) {
                    Some(task) => self.run_task(task, &state, request, run_dir, cancel).await,
                    None => TaskResult::failed(
                        task_id.as_str(),
                        AnalystError::TaskNotFound(task_id.clone()).to_string(),
                    ),
                }
            };

            if result.success && result.insight.is_none() {
                let stdout = result.stdout.split(STDERR_SEPARATOR).next().unwrap_or_default();
                result.insight = Some(json!({
                    "summary": truncate_chars(stdout.trim(), EXCERPT_CHARS),
                }));
            }

            let kind = if result.success {
                info!(task_id = %task_id, duration_ms = result.duration_ms, "task completed");
                ProgressKind::TaskCompleted
            } else {
                let message = result.error_message.as_deref().unwrap_or("unknown error");
                info!(task_id = %task_id, error = %message, "task failed");
                state.errors.push(format!("{task_id}: {message}"));
                ProgressKind::TaskError
            };
            let mut event = progress
                .event(kind, stage, task_percent(i + 1, total))
                .with_task(task_id.as_str())
                .with_result(&result);
            if let Some(message) = &result.error_message {
                event = event.with_message(message.clone());
            }
            progress.emit(event);

            state.record_result(result);
        }

        state.cancelled = cancel.is_cancelled();
        state.complete_stage(stage);
        state
    }

    fn report(
        &self,
        mut state: WorkflowState,
        run_dir: &Path,
        progress: &mut ProgressEmitter<'_>,
    ) -> AnalysisReport {
        let stage = Stage::Report;
        progress.emit(progress.event(ProgressKind::StageStarted, stage, stage.start_percent()));
        state.complete_stage(stage);

        let mut report = AnalysisReport::synthesize(&state);
        report.run_dir = Some(run_dir.to_path_buf());
        match report.save(run_dir) {
            Ok(path) => info!(path = %path.display(), "report written"),
            Err(e) => {
                warn!(error = %e, "could not write report");
                report.errors.push(format!("report not saved: {e}"));
                progress.emit(
                    progress
                        .event(ProgressKind::StageError, stage, progress.last_percent())
                        .with_message(e.to_string()),
                );
            }
        }

        info!(
            run_id = %report.run_id,
            status = %report.status,
            succeeded = report.succeeded,
            failed = report.failed,
            "analysis run finished"
        );
        progress.emit(
            progress
                .event(ProgressKind::WorkflowCompleted, stage, stage.end_percent())
                .with_message(report.status.as_str()),
        );
        report
    }

    // -----------------------------------------------------------------------
    // One task
    // -----------------------------------------------------------------------

    /// Generate, sanitize, validate and execute one task's script.
    async fn run_task(
        &self,
        task: &TaskDescriptor,
        state: &WorkflowState,
        request: &AnalysisRequest,
        run_dir: &Path,
        cancel: &CancellationToken,
    ) -> TaskResult {
        let prior = prior_excerpts(state.results_in_order());
        let prompt = task.build_prompt(&state.digest, &state.question, &prior);

        let generated = match &self.gateway {
            Some(gateway) => {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return TaskResult::cancelled(task.id.as_str()),
                    outcome = gateway.generate_code(&self.identity, &prompt) => outcome,
                };
                match outcome {
                    Ok(code) => code,
                    Err(e) => {
                        return TaskResult::failed(task.id.as_str(), format!("code generation failed: {e}"))
                    }
                }
            }
            None => parse_generated_code(""),
        };

        let sanitized = sanitize(&generated.raw_text);
        let generated = generated.with_sanitized(sanitized);

        let mut result = match validate_with_repair(generated.code()) {
            Ok(valid) => {
                if valid.repaired {
                    info!(task_id = %task.id, "generated code passed after normalisation");
                }
                self.engine
                    .execute(&task.id, &valid.code, &request.dataset, &request.filename, run_dir, cancel)
                    .await
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "generated code rejected");
                TaskResult::failed(task.id.as_str(), format!("generated code rejected: {e}"))
            }
        };
        annotate(&mut result, &generated);
        result
    }
}

fn annotate(result: &mut TaskResult, generated: &GeneratedCode) {
    if !generated.description.is_empty() {
        result.description = Some(generated.description.clone());
    }
    result.fallback_code = generated.fallback;
}

fn new_run_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        chrono::Utc::now().format("%Y%m%dT%H%M%S"),
        &suffix[..8]
    )
}
