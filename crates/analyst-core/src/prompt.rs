use crate::types::{DataDigest, TaskDescriptor, TaskResult};
use std::fmt::Write as _;

/// Characters kept from each prior task's output.
pub const EXCERPT_CHARS: usize = 300;
/// Prior tasks quoted in a prompt, newest last.
pub const MAX_EXCERPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorExcerpt {
    pub task_id: String,
    pub output: String,
    pub insight: Option<String>,
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Condensed view of already-finished tasks in this run. Takes the last
/// [`MAX_EXCERPTS`] results, each bounded to [`EXCERPT_CHARS`].
pub fn prior_excerpts<'a>(completed: impl IntoIterator<Item = &'a TaskResult>) -> Vec<PriorExcerpt> {
    let all: Vec<&TaskResult> = completed.into_iter().collect();
    let skip = all.len().saturating_sub(MAX_EXCERPTS);
    all.into_iter()
        .skip(skip)
        .map(|r| PriorExcerpt {
            task_id: r.task_id.clone(),
            output: if r.success {
                truncate_chars(r.stdout.trim(), EXCERPT_CHARS)
            } else {
                format!(
                    "(failed: {})",
                    truncate_chars(r.error_message.as_deref().unwrap_or("unknown error"), EXCERPT_CHARS)
                )
            },
            insight: r
                .insight
                .as_ref()
                .map(|v| truncate_chars(&v.to_string(), EXCERPT_CHARS)),
        })
        .collect()
}

fn write_dataset_section(out: &mut String, digest: &DataDigest) {
    let _ = writeln!(out, "## Dataset");
    let _ = writeln!(out, "File: {} ({} rows)", digest.filename, digest.row_count);
    let _ = writeln!(out, "Columns:");
    for (name, ty) in digest.columns() {
        let missing = digest.missing_values.get(name).copied().unwrap_or(0);
        let _ = writeln!(out, "- {name}: {ty} ({missing} missing)");
    }
    if !digest.sample_rows.is_empty() {
        let _ = writeln!(out, "Sample rows:");
        let _ = writeln!(out, "{}", digest.column_names.join(" | "));
        for row in &digest.sample_rows {
            let _ = writeln!(out, "{}", row.join(" | "));
        }
    }
}

impl TaskDescriptor {
    /// Prompt asking the service for this task's analysis script.
    pub fn build_prompt(&self, digest: &DataDigest, question: &str, prior: &[PriorExcerpt]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "You are a data analyst writing a Python script.");
        let _ = writeln!(out);
        let _ = writeln!(out, "## Task: {}", self.display_name);
        let _ = writeln!(out, "{}", self.description);
        if !self.specialty_tags.is_empty() {
            let _ = writeln!(out, "Specialties: {}", self.specialty_tags.join(", "));
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "## Question");
        let _ = writeln!(out, "{}", question.trim());
        let _ = writeln!(out);
        write_dataset_section(&mut out, digest);

        if !prior.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Findings from earlier tasks in this run");
            for p in prior {
                let _ = writeln!(out, "### {}", p.task_id);
                let _ = writeln!(out, "{}", p.output);
                if let Some(insight) = &p.insight {
                    let _ = writeln!(out, "Insights: {insight}");
                }
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "## Rules");
        let _ = writeln!(
            out,
            "- The dataset is already loaded as `df` (a pandas DataFrame). Do not read files."
        );
        let _ = writeln!(
            out,
            "- Use matplotlib for charts and call plt.show(); figures are saved automatically."
        );
        let _ = writeln!(
            out,
            "- Write tables with DataFrame.to_csv('<name>.csv') in the current directory."
        );
        let _ = writeln!(
            out,
            "- Do not import os, subprocess, socket or network libraries. Do not use eval or exec."
        );
        let _ = writeln!(
            out,
            "- Put key findings in a dict named `insights` with JSON-serialisable values."
        );
        let _ = writeln!(out, "- Print a readable summary of the results.");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Reply with one line describing the analysis, then the code in a single ```python fenced block."
        );
        out
    }
}

/// Prompt asking the service to choose among candidate tasks.
pub fn build_selection_prompt(
    candidates: &[&TaskDescriptor],
    digest: &DataDigest,
    question: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Choose the analysis tasks that best answer the question for this dataset."
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "## Question");
    let _ = writeln!(out, "{}", question.trim());
    let _ = writeln!(out);
    write_dataset_section(&mut out, digest);
    let _ = writeln!(out);
    let _ = writeln!(out, "## Available tasks");
    for t in candidates {
        let _ = writeln!(out, "- {}: {}", t.id, t.description);
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Reply with a JSON array of task ids only, for example [\"{}\"].",
        candidates.first().map(|t| t.id.as_str()).unwrap_or("data_profiling")
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TaskCatalog;
    use crate::types::ColumnType;
    use std::collections::BTreeMap;

    fn digest() -> DataDigest {
        DataDigest {
            filename: "sales.csv".into(),
            column_names: vec!["customer_id".into(), "revenue".into()],
            inferred_types: vec![ColumnType::Integer, ColumnType::Float],
            row_count: 50,
            missing_values: BTreeMap::from([("revenue".to_string(), 2)]),
            sample_rows: vec![vec!["1".into(), "9.5".into()]],
        }
    }

    fn result(id: &str, stdout: &str) -> TaskResult {
        TaskResult {
            success: true,
            stdout: stdout.into(),
            error_message: None,
            ..TaskResult::failed(id, "")
        }
    }

    #[test]
    fn truncation_marks_cut() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc…");
        assert_eq!(truncate_chars("ééé", 2), "éé…");
    }

    #[test]
    fn excerpts_keep_last_five_bounded() {
        let long = "x".repeat(1000);
        let results: Vec<TaskResult> = (0..7).map(|i| result(&format!("t{i}"), &long)).collect();
        let ex = prior_excerpts(&results);
        assert_eq!(ex.len(), MAX_EXCERPTS);
        assert_eq!(ex[0].task_id, "t2");
        assert_eq!(ex[4].task_id, "t6");
        assert!(ex.iter().all(|e| e.output.chars().count() <= EXCERPT_CHARS + 1));
    }

    #[test]
    fn failed_results_are_summarised() {
        let ex = prior_excerpts(&[TaskResult::failed("t", "timed out")]);
        assert_eq!(ex[0].output, "(failed: timed out)");
    }

    #[test]
    fn task_prompt_embeds_context() {
        let catalog = TaskCatalog::builtin();
        let task = catalog.get("churn_prediction").unwrap();
        let prior = prior_excerpts(&[result("data_profiling", "shape: (50, 2)")]);
        let p = task.build_prompt(&digest(), "predict churn", &prior);
        assert!(p.contains("## Task: Churn Prediction"));
        assert!(p.contains("predict churn"));
        assert!(p.contains("- revenue: float (2 missing)"));
        assert!(p.contains("customer_id | revenue"));
        assert!(p.contains("### data_profiling"));
        assert!(p.contains("shape: (50, 2)"));
        assert!(p.contains("```python"));
    }

    #[test]
    fn selection_prompt_lists_candidates() {
        let catalog = TaskCatalog::builtin();
        let cands: Vec<&TaskDescriptor> = catalog.iter().take(2).collect();
        let p = build_selection_prompt(&cands, &digest(), "why?");
        assert!(p.contains("- anomaly_detection:"));
        assert!(p.contains("JSON array"));
    }
}
