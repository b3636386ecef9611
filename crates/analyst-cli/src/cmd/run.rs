use crate::output::{print_json, print_table};
use analyst_codegen::{Gateway, HttpBackend, ResilienceRegistry};
use analyst_core::config::{AnalystConfig, WarnLevel};
use analyst_core::report::{AnalysisReport, RunStatus};
use analyst_core::types::AnalysisRequest;
use analyst_core::workflow::{Orchestrator, ProgressEvent, ProgressKind};
use analyst_core::CancellationToken;
use anyhow::Context;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Exit code when the run finished but no task succeeded.
pub const EXIT_NO_TASK_SUCCEEDED: i32 = 2;
/// Exit code when the run was interrupted.
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Args)]
pub struct RunArgs {
    /// Dataset file (.csv, .tsv, .txt or .json)
    pub dataset: PathBuf,

    /// The question to answer
    #[arg(long, short = 'q')]
    pub question: String,

    /// Skip the code-generation service: select tasks locally and run the
    /// built-in summary script for each
    #[arg(long)]
    pub offline: bool,
}

pub fn run(root: &Path, config: Option<&Path>, args: RunArgs, json: bool) -> anyhow::Result<i32> {
    let config = super::load_config(root, config)?;
    let errors: Vec<String> = config
        .validate()
        .into_iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message)
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }

    let dataset = std::fs::read(&args.dataset)
        .with_context(|| format!("failed to read dataset {}", args.dataset.display()))?;
    let filename = args
        .dataset
        .file_name()
        .and_then(|n| n.to_str())
        .context("dataset path has no usable file name")?
        .to_string();
    let request = AnalysisRequest::new(dataset, filename, args.question);

    let gateway = if args.offline {
        None
    } else {
        Some(build_gateway(&config)?)
    };
    let orchestrator = Orchestrator::new(&config, root, gateway);
    let events = orchestrator.subscribe();

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async move {
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupted, cancelling remaining tasks");
                interrupt.cancel();
            }
        });

        let printer = tokio::spawn(print_progress(events, json));
        let report = orchestrator.run(request, cancel).await;
        // Dropping the orchestrator closes the channel and ends the printer.
        drop(orchestrator);
        let _ = printer.await;
        report
    })?;

    print_summary(&report, json)?;
    Ok(match report.status {
        RunStatus::NoTaskSucceeded => EXIT_NO_TASK_SUCCEEDED,
        RunStatus::Cancelled => EXIT_CANCELLED,
        RunStatus::Completed | RunStatus::CompletedWithFailures => 0,
    })
}

fn build_gateway(config: &AnalystConfig) -> anyhow::Result<Gateway> {
    let registry = ResilienceRegistry::new(
        config.resilience.circuit_breaker,
        config.resilience.rate_limit,
    );
    let backend = HttpBackend::new(config.service.clone())
        .context("failed to create code-generation client")?;
    Ok(Gateway::new(Arc::new(backend), &registry, config.resilience.retry))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Progress goes to stderr so stdout carries only the summary.
async fn print_progress(mut rx: broadcast::Receiver<ProgressEvent>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(mut event) => {
                if json {
                    // The report carries full results; keep event lines small.
                    event.result = None;
                    if let Ok(line) = serde_json::to_string(&event) {
                        eprintln!("{line}");
                    }
                } else {
                    eprintln!("{}", progress_line(&event));
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "progress printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn progress_line(event: &ProgressEvent) -> String {
    let subject = event.task_id.as_deref().unwrap_or(event.stage.as_str());
    let mut line = format!("[{:>3}%] {:<18} {subject}", event.percent, event.kind.as_str());
    if let Some(message) = &event.message {
        if event.kind != ProgressKind::TaskStarted {
            line.push_str(": ");
            line.push_str(message);
        }
    }
    line
}

fn print_summary(report: &AnalysisReport, json: bool) -> anyhow::Result<()> {
    let report_file = report
        .run_dir
        .as_ref()
        .map(|d| analyst_core::paths::report_path(d));

    if json {
        let value = serde_json::json!({
            "run_id": report.run_id,
            "success": report.success,
            "status": report.status,
            "succeeded": report.succeeded,
            "failed": report.failed,
            "selection_method": report.selection_method,
            "tasks": report.tasks,
            "errors": report.errors,
            "report": report_file,
        });
        return print_json(&value);
    }

    println!(
        "Run {}: {} ({} succeeded, {} failed)",
        report.run_id, report.status, report.succeeded, report.failed
    );
    println!();
    let rows = report
        .tasks
        .iter()
        .map(|t| {
            vec![
                t.task_id.clone(),
                if t.success { "ok" } else { "failed" }.to_string(),
                format!("{}ms", t.duration_ms),
                t.artifact_count.to_string(),
                t.error_message
                    .clone()
                    .or_else(|| t.description.clone())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["TASK", "STATUS", "TIME", "ARTIFACTS", "NOTE"], rows);

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {e}");
        }
    }
    if let Some(path) = report_file {
        println!();
        println!("Report: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::workflow::Stage;

    #[test]
    fn progress_line_shows_task_and_message() {
        let ev = ProgressEvent::new("r", ProgressKind::TaskError, Stage::Execute, 55)
            .with_task("churn_prediction")
            .with_message("timed out");
        assert_eq!(
            progress_line(&ev),
            "[ 55%] task_error         churn_prediction: timed out"
        );
    }

    #[test]
    fn progress_line_falls_back_to_stage() {
        let ev = ProgressEvent::new("r", ProgressKind::StageStarted, Stage::Select, 10);
        assert_eq!(progress_line(&ev), "[ 10%] stage_started      select");
    }
}
