pub mod check;
pub mod config;
pub mod run;
pub mod tasks;

use analyst_core::config::AnalystConfig;
use anyhow::Context;
use std::path::Path;

/// `--config` when given, else `.analyst/config.yaml` under `root` (or
/// defaults when that file does not exist).
pub fn load_config(root: &Path, explicit: Option<&Path>) -> anyhow::Result<AnalystConfig> {
    match explicit {
        Some(path) => AnalystConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => AnalystConfig::load(root).context("failed to load config"),
    }
}
