use crate::catalog::{TaskCatalog, DEFAULT_TASKS};
use crate::config::SelectionConfig;
use crate::prompt::build_selection_prompt;
use crate::signals::detect_signals;
use crate::types::{DataDigest, DataSignal, TaskDescriptor};
use analyst_codegen::Gateway;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Chosen by the code-generation service.
    Remote,
    /// Local keyword/column heuristic.
    Local,
    /// Nothing cleared the threshold; configured defaults.
    Default,
}

impl SelectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionMethod::Remote => "remote",
            SelectionMethod::Local => "local",
            SelectionMethod::Default => "default",
        }
    }
}

impl fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// Selected ids, unordered with respect to dependencies.
    pub task_ids: Vec<String>,
    pub method: SelectionMethod,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub task: &'a TaskDescriptor,
    /// 1.0 if question-relevant plus 0.5 if signal-compatible.
    pub score: f64,
}

/// Tasks that are compatible with the dataset OR relevant to the question,
/// best first (ties by id). No cap on the count.
pub fn prefilter<'a>(
    catalog: &'a TaskCatalog,
    signals: &BTreeSet<DataSignal>,
    question: &str,
) -> Vec<Candidate<'a>> {
    let mut out: Vec<Candidate<'a>> = catalog
        .iter()
        .filter_map(|task| {
            let relevant = task.is_relevant(question);
            let compatible = task.is_compatible(signals);
            if !relevant && !compatible {
                return None;
            }
            let mut score = 0.0;
            if relevant {
                score += 1.0;
            }
            if compatible {
                score += 0.5;
            }
            Some(Candidate { task, score })
        })
        .collect();
    out.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.task.id.cmp(&b.task.id)));
    out
}

fn array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*?\]").unwrap())
}

/// Ids named by the first JSON array in `reply`, restricted to `allowed`,
/// first occurrence kept. Empty when the reply is unusable.
pub fn parse_selection_reply(reply: &str, allowed: &[&str]) -> Vec<String> {
    let Some(m) = array_re().find(reply) else {
        return Vec::new();
    };
    let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(m.as_str()) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    values
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .filter(|id| allowed.contains(id))
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Score `candidates` with the local heuristic; every score above the
/// threshold is selected. Falls back to the configured defaults, and the
/// result is never empty while the catalog has tasks.
pub fn local_select(
    catalog: &TaskCatalog,
    candidates: &[Candidate<'_>],
    digest: &DataDigest,
    question: &str,
    signals: &BTreeSet<DataSignal>,
    config: &SelectionConfig,
) -> Selection {
    let mut chosen: Vec<String> = candidates
        .iter()
        .filter(|c| c.task.relevance_score(question, digest, signals) > config.score_threshold)
        .map(|c| c.task.id.clone())
        .collect();
    chosen.sort();

    if !chosen.is_empty() {
        return Selection {
            task_ids: chosen,
            method: SelectionMethod::Local,
            warnings: Vec::new(),
        };
    }

    Selection {
        task_ids: default_selection(catalog, config),
        method: SelectionMethod::Default,
        warnings: vec![format!(
            "no task scored above {}; using default tasks",
            config.score_threshold
        )],
    }
}

fn default_selection(catalog: &TaskCatalog, config: &SelectionConfig) -> Vec<String> {
    let known = |ids: Vec<String>| -> Vec<String> {
        let mut seen = HashSet::new();
        ids.into_iter()
            .filter(|id| catalog.contains(id) && seen.insert(id.clone()))
            .collect()
    };
    let configured = known(config.default_tasks.clone());
    if !configured.is_empty() {
        return configured;
    }
    let builtin = known(DEFAULT_TASKS.iter().map(|s| s.to_string()).collect());
    if !builtin.is_empty() {
        return builtin;
    }
    catalog.ids().take(1).map(str::to_string).collect()
}

/// Choose tasks for a run.
///
/// Prefilters the catalog, asks the service (when a gateway is given and
/// remote selection is enabled) to pick among the candidates, and falls
/// back to local scoring when the service fails or names nothing usable.
pub async fn select_tasks(
    gateway: Option<&Gateway>,
    identity: &str,
    catalog: &TaskCatalog,
    digest: &DataDigest,
    question: &str,
    config: &SelectionConfig,
) -> Selection {
    let signals = detect_signals(digest);
    let candidates = prefilter(catalog, &signals, question);
    let mut warnings = Vec::new();

    let remote = gateway.filter(|_| config.remote && !candidates.is_empty());
    if let Some(gateway) = remote {
        let tasks: Vec<&TaskDescriptor> = candidates.iter().map(|c| c.task).collect();
        let allowed: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        let prompt = build_selection_prompt(&tasks, digest, question);
        match gateway.complete(identity, &prompt).await {
            Ok(reply) => {
                let task_ids = parse_selection_reply(&reply, &allowed);
                if !task_ids.is_empty() {
                    info!(count = task_ids.len(), "tasks selected by service");
                    return Selection {
                        task_ids,
                        method: SelectionMethod::Remote,
                        warnings,
                    };
                }
                warn!("service selection named no candidate task, scoring locally");
                warnings.push("service selection named no candidate task; scored locally".to_string());
            }
            Err(e) => {
                warn!(error = %e, "service selection failed, scoring locally");
                warnings.push(format!("service selection failed ({e}); scored locally"));
            }
        }
    }

    let mut selection = local_select(catalog, &candidates, digest, question, &signals, config);
    info!(
        method = %selection.method,
        count = selection.task_ids.len(),
        "tasks selected"
    );
    warnings.append(&mut selection.warnings);
    selection.warnings = warnings;
    selection
}
