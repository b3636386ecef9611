use crate::error::Result;
use crate::io::atomic_write;
use crate::paths::report_path;
use crate::selector::SelectionMethod;
use crate::types::TaskResult;
use crate::workflow::WorkflowState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Aggregate outcome of a run. `AnalysisReport::success` stays true for
/// every variant; this is where task-level failure shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithFailures,
    NoTaskSucceeded,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithFailures => "completed_with_failures",
            RunStatus::NoTaskSucceeded => "no_task_succeeded",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub filename: String,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub artifact_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fallback_code: bool,
}

impl From<&TaskResult> for TaskSummary {
    fn from(r: &TaskResult) -> Self {
        Self {
            task_id: r.task_id.clone(),
            success: r.success,
            error_message: r.error_message.clone(),
            duration_ms: r.duration_ms,
            artifact_count: r.artifacts.len(),
            description: r.description.clone(),
            fallback_code: r.fallback_code,
        }
    }
}

/// Final product of a run: which tasks succeeded, which failed and why,
/// the shared insights, and the full per-task results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: String,
    pub question: String,
    pub generated_at: DateTime<Utc>,
    /// Report synthesis completed. Task failures do not clear it.
    pub success: bool,
    pub status: RunStatus,
    pub succeeded: usize,
    pub failed: usize,
    pub dataset: DatasetSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_method: Option<SelectionMethod>,
    /// Execution order.
    pub tasks: Vec<TaskSummary>,
    pub insights: BTreeMap<String, Value>,
    pub errors: Vec<String>,
    pub results: Vec<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_dir: Option<PathBuf>,
}

impl AnalysisReport {
    pub fn synthesize(state: &WorkflowState) -> Self {
        let results: Vec<TaskResult> = state.results_in_order().cloned().collect();
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        let cancelled = state.cancelled || results.iter().any(TaskResult::is_cancelled);

        let status = if cancelled {
            RunStatus::Cancelled
        } else if succeeded == 0 {
            RunStatus::NoTaskSucceeded
        } else if failed > 0 {
            RunStatus::CompletedWithFailures
        } else {
            RunStatus::Completed
        };

        Self {
            run_id: state.run_id.clone(),
            question: state.question.clone(),
            generated_at: Utc::now(),
            success: true,
            status,
            succeeded,
            failed,
            dataset: DatasetSummary {
                filename: state.digest.filename.clone(),
                rows: state.digest.row_count,
                columns: state.digest.column_count(),
            },
            selection_method: state.selection_method,
            tasks: results.iter().map(TaskSummary::from).collect(),
            insights: state.shared_insights.clone(),
            errors: state.errors.clone(),
            results,
            run_dir: None,
        }
    }

    /// Write `report.json` into `dir` atomically. Returns the path written.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = report_path(dir);
        let data = serde_json::to_string_pretty(self)?;
        atomic_write(&path, data.as_bytes())?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}
