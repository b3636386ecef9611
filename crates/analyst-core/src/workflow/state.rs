use crate::selector::SelectionMethod;
use crate::types::{DataDigest, TaskResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Insight key for the facts seeded from the digest. Not a valid task id,
/// so it never collides with a task's entry.
pub const DATASET_INSIGHT_KEY: &str = "_dataset";

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Pipeline stages in execution order.
///
/// Transitions: `Ingest → Select → Execute → Report`. Ingest failure ends
/// the run; every later failure is absorbed and the run reaches `Report`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Select,
    Execute,
    Report,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[Stage::Ingest, Stage::Select, Stage::Execute, Stage::Report]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Select => "select",
            Stage::Execute => "execute",
            Stage::Report => "report",
        }
    }

    /// Progress percentage when the stage starts.
    pub fn start_percent(self) -> u8 {
        match self {
            Stage::Ingest => 0,
            Stage::Select => 10,
            Stage::Execute => 20,
            Stage::Report => 90,
        }
    }

    /// Progress percentage when the stage completes.
    pub fn end_percent(self) -> u8 {
        match self {
            Stage::Ingest => 10,
            Stage::Select => 20,
            Stage::Execute => 90,
            Stage::Report => 100,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// Everything a run has accumulated so far. Created once the digest exists
/// and passed by value from stage to stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowState {
    pub run_id: String,
    pub question: String,
    pub digest: DataDigest,
    /// Dependency-consistent execution order.
    pub selected_task_ids: Vec<String>,
    pub selection_method: Option<SelectionMethod>,
    pub task_results: BTreeMap<String, TaskResult>,
    pub progress_percent: u8,
    pub completed_stages: Vec<Stage>,
    pub errors: Vec<String>,
    pub shared_insights: BTreeMap<String, Value>,
    pub cancelled: bool,
}

impl WorkflowState {
    /// Fresh state after ingest, with the digest facts seeded as insights.
    pub fn new(run_id: impl Into<String>, question: impl Into<String>, digest: DataDigest) -> Self {
        let mut shared_insights = BTreeMap::new();
        shared_insights.insert(DATASET_INSIGHT_KEY.to_string(), digest_facts(&digest));
        Self {
            run_id: run_id.into(),
            question: question.into(),
            digest,
            selected_task_ids: Vec::new(),
            selection_method: None,
            task_results: BTreeMap::new(),
            progress_percent: 0,
            completed_stages: Vec::new(),
            errors: Vec::new(),
            shared_insights,
            cancelled: false,
        }
    }

    pub fn complete_stage(&mut self, stage: Stage) {
        if !self.completed_stages.contains(&stage) {
            self.completed_stages.push(stage);
        }
        self.progress_percent = self.progress_percent.max(stage.end_percent());
    }

    pub fn is_stage_complete(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Store a task's result and publish its insight, if any. A later
    /// result for the same task replaces the earlier one.
    pub fn record_result(&mut self, result: TaskResult) {
        if let Some(insight) = &result.insight {
            self.shared_insights.insert(result.task_id.clone(), insight.clone());
        }
        self.task_results.insert(result.task_id.clone(), result);
    }

    /// Results for the selected tasks in execution order, skipping tasks
    /// that have not run yet.
    pub fn results_in_order(&self) -> impl Iterator<Item = &TaskResult> + '_ {
        self.selected_task_ids
            .iter()
            .filter_map(|id| self.task_results.get(id))
    }

    pub fn succeeded(&self) -> usize {
        self.task_results.values().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.task_results.values().filter(|r| !r.success).count()
    }
}

fn digest_facts(digest: &DataDigest) -> Value {
    let columns: BTreeMap<&str, &str> = digest
        .columns()
        .map(|(name, ty)| (name, ty.as_str()))
        .collect();
    let missing: usize = digest.missing_values.values().sum();
    json!({
        "filename": digest.filename,
        "rows": digest.row_count,
        "column_count": digest.column_count(),
        "columns": columns,
        "missing_values": missing,
    })
}
