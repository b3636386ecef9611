use super::state::Stage;
use crate::types::TaskResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Buffered events per subscriber before a slow receiver starts lagging.
pub const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    StageStarted,
    TaskStarted,
    TaskCompleted,
    TaskError,
    StageError,
    WorkflowCompleted,
}

impl ProgressKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressKind::StageStarted => "stage_started",
            ProgressKind::TaskStarted => "task_started",
            ProgressKind::TaskCompleted => "task_completed",
            ProgressKind::TaskError => "task_error",
            ProgressKind::StageError => "stage_error",
            ProgressKind::WorkflowCompleted => "workflow_completed",
        }
    }
}

impl fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a run, as seen by a progress subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: String,
    pub kind: ProgressKind,
    pub stage: Stage,
    /// 0..=100, non-decreasing within a run.
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Attached to `task_completed` and `task_error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<TaskResult>>,
    pub at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(run_id: impl Into<String>, kind: ProgressKind, stage: Stage, percent: u8) -> Self {
        Self {
            run_id: run_id.into(),
            kind,
            stage,
            percent: percent.min(100),
            task_id: None,
            message: None,
            result: None,
            at: Utc::now(),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_result(mut self, result: &TaskResult) -> Self {
        self.result = Some(Box::new(result.clone()));
        self
    }
}

/// Fire-and-forget publisher for one run.
///
/// Sending never blocks and never fails: with no subscribers the event is
/// dropped. Percentages are clamped so they never go backwards.
pub struct ProgressEmitter<'a> {
    tx: &'a broadcast::Sender<ProgressEvent>,
    run_id: String,
    last_percent: u8,
}

impl<'a> ProgressEmitter<'a> {
    pub fn new(tx: &'a broadcast::Sender<ProgressEvent>, run_id: impl Into<String>) -> Self {
        Self {
            tx,
            run_id: run_id.into(),
            last_percent: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn last_percent(&self) -> u8 {
        self.last_percent
    }

    /// Start an event for this run; finish it with the `with_*` builders
    /// and hand it to [`emit`](Self::emit).
    pub fn event(&self, kind: ProgressKind, stage: Stage, percent: u8) -> ProgressEvent {
        ProgressEvent::new(self.run_id.clone(), kind, stage, percent)
    }

    pub fn emit(&mut self, mut event: ProgressEvent) {
        event.percent = event.percent.max(self.last_percent);
        self.last_percent = event.percent;
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }
}

/// Percentage reached after `done` of `total` tasks within the execute stage.
pub fn task_percent(done: usize, total: usize) -> u8 {
    let start = Stage::Execute.start_percent() as usize;
    let span = (Stage::Execute.end_percent() - Stage::Execute.start_percent()) as usize;
    if total == 0 {
        return Stage::Execute.end_percent();
    }
    (start + span * done.min(total) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_without_subscribers_is_a_no_op() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let mut em = ProgressEmitter::new(&tx, "r");
        let ev = em.event(ProgressKind::StageStarted, Stage::Ingest, 0);
        em.emit(ev);
        assert_eq!(em.last_percent(), 0);
    }

    #[test]
    fn percentages_never_decrease() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut em = ProgressEmitter::new(&tx, "r");
        for p in [10, 5, 40, 20] {
            let ev = em.event(ProgressKind::TaskStarted, Stage::Execute, p);
            em.emit(ev);
        }
        let seen: Vec<u8> = std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.percent).collect();
        assert_eq!(seen, [10, 10, 40, 40]);
    }

    #[test]
    fn task_percent_spans_execute_stage() {
        assert_eq!(task_percent(0, 4), 20);
        assert_eq!(task_percent(2, 4), 55);
        assert_eq!(task_percent(4, 4), 90);
        assert_eq!(task_percent(0, 0), 90);
    }

    #[test]
    fn event_json_shape() {
        let ev = ProgressEvent::new("r", ProgressKind::TaskError, Stage::Execute, 150)
            .with_task("t")
            .with_message("boom");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["kind"], "task_error");
        assert_eq!(v["stage"], "execute");
        assert_eq!(v["percent"], 100);
        assert_eq!(v["task_id"], "t");
        assert!(v.get("result").is_none());
    }
}
