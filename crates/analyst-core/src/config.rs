use crate::catalog::TaskCatalog;
use crate::error::{AnalystError, Result};
use crate::paths;
use crate::types::TaskDescriptor;
use analyst_codegen::{BreakerConfig, RateLimitConfig, RetryPolicy, ServiceConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ResilienceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

// ---------------------------------------------------------------------------
// SandboxConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Root for run directories. Relative paths resolve against the project root.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Wall-clock limit per execution attempt.
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,
    /// Interpreters tried before the discovered defaults, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interpreters: Vec<String>,
    #[serde(default = "default_inline_image_limit")]
    pub inline_image_limit_bytes: u64,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(paths::RUNS_DIR)
}

fn default_sandbox_timeout() -> u64 {
    300
}

fn default_inline_image_limit() -> u64 {
    1024 * 1024
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            timeout_secs: default_sandbox_timeout(),
            interpreters: Vec::new(),
            inline_image_limit_bytes: default_inline_image_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// SelectionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Local heuristic scores must exceed this to be selected.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    #[serde(default = "default_default_tasks")]
    pub default_tasks: Vec<String>,
    /// Ask the service to pick tasks before falling back to local scoring.
    #[serde(default = "default_remote")]
    pub remote: bool,
}

fn default_score_threshold() -> f64 {
    0.3
}

fn default_default_tasks() -> Vec<String> {
    vec!["data_profiling".into(), "correlation_analysis".into()]
}

fn default_remote() -> bool {
    true
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
            default_tasks: default_default_tasks(),
            remote: default_remote(),
        }
    }
}

// ---------------------------------------------------------------------------
// AnalystConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Extra tasks, or replacements for built-in tasks with the same id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskDescriptor>,
}

fn default_version() -> u32 {
    1
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            service: ServiceConfig::default(),
            resilience: ResilienceConfig::default(),
            sandbox: SandboxConfig::default(),
            selection: SelectionConfig::default(),
            tasks: Vec::new(),
        }
    }
}

impl AnalystConfig {
    /// Load `.analyst/config.yaml` under `root`, or defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load an explicit config file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AnalystError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: AnalystConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Built-in tasks merged with `tasks` from this config.
    pub fn catalog(&self) -> TaskCatalog {
        TaskCatalog::builtin().with_overrides(&self.tasks)
    }

    pub fn work_dir(&self, root: &Path) -> PathBuf {
        paths::resolve_under(root, &self.sandbox.work_dir)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.service.endpoint.trim().is_empty() {
            warnings.push(ConfigWarning::error("service.endpoint is empty"));
        }

        let cb = &self.resilience.circuit_breaker;
        if cb.failure_threshold == 0 {
            warnings.push(ConfigWarning::error(
                "resilience.circuit_breaker.failure_threshold is 0",
            ));
        }
        if cb.success_threshold == 0 {
            warnings.push(ConfigWarning::error(
                "resilience.circuit_breaker.success_threshold is 0",
            ));
        }
        if self.resilience.rate_limit.max_calls == 0 {
            warnings.push(ConfigWarning::error(
                "resilience.rate_limit.max_calls is 0: every code-generation call will be rejected",
            ));
        }

        let retry = &self.resilience.retry;
        if retry.max_attempts == 0 {
            warnings.push(ConfigWarning::warning(
                "resilience.retry.max_attempts is 0, treated as 1",
            ));
        } else if retry.max_attempts > 10 {
            warnings.push(ConfigWarning::warning(format!(
                "resilience.retry.max_attempts={} (>10 is unusual)",
                retry.max_attempts
            )));
        }

        if self.sandbox.timeout_secs == 0 {
            warnings.push(ConfigWarning::error("sandbox.timeout_secs is 0"));
        }

        let threshold = self.selection.score_threshold;
        if !(0.0..1.0).contains(&threshold) {
            warnings.push(ConfigWarning::warning(format!(
                "selection.score_threshold={threshold} is outside [0, 1): local scoring will select nothing"
            )));
        }

        let catalog = self.catalog();
        for id in &self.selection.default_tasks {
            if !catalog.contains(id) {
                warnings.push(ConfigWarning::warning(format!(
                    "unknown task '{id}' in selection.default_tasks"
                )));
            }
        }

        for task in &self.tasks {
            if !paths::is_valid_task_id(&task.id) {
                warnings.push(ConfigWarning::error(format!(
                    "invalid task id '{}': use lowercase letters, digits and underscores",
                    task.id
                )));
            }
            for dep in &task.dependencies {
                if !catalog.contains(dep) {
                    warnings.push(ConfigWarning::warning(format!(
                        "task '{}' depends on unknown task '{dep}'",
                        task.id
                    )));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AnalystConfig::load(dir.path()).unwrap();
        assert_eq!(cfg, AnalystConfig::default());
        assert_eq!(cfg.sandbox.timeout_secs, 300);
        assert_eq!(cfg.resilience.circuit_breaker.failure_threshold, 5);
        assert_eq!(cfg.resilience.rate_limit.max_calls, 30);
        assert_eq!(cfg.resilience.retry.max_attempts, 3);
        assert_eq!(cfg.service.api_key_env, "ANALYST_API_KEY");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = AnalystConfig::load_from(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, AnalystError::Config(_)));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = r#"
sandbox:
  timeout_secs: 30
resilience:
  circuit_breaker:
    failure_threshold: 2
selection:
  score_threshold: 0.5
"#;
        let cfg: AnalystConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.sandbox.timeout_secs, 30);
        assert_eq!(cfg.sandbox.inline_image_limit_bytes, 1024 * 1024);
        assert_eq!(cfg.resilience.circuit_breaker.failure_threshold, 2);
        assert_eq!(cfg.resilience.circuit_breaker.timeout_secs, 60);
        assert_eq!(cfg.selection.score_threshold, 0.5);
        assert_eq!(
            cfg.selection.default_tasks,
            vec!["data_profiling", "correlation_analysis"]
        );
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = AnalystConfig::default();
        cfg.sandbox.interpreters = vec!["/opt/py/bin/python3".into()];
        cfg.save(dir.path()).unwrap();
        let loaded = AnalystConfig::load(dir.path()).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn empty_tasks_not_serialized() {
        let yaml = serde_yaml::to_string(&AnalystConfig::default()).unwrap();
        assert!(!yaml.lines().any(|l| l.starts_with("tasks:")));
        assert!(yaml.contains("default_tasks"));
    }

    #[test]
    fn validate_default_config_no_warnings() {
        assert!(AnalystConfig::default().validate().is_empty());
    }

    #[test]
    fn validate_flags_zero_thresholds() {
        let mut cfg = AnalystConfig::default();
        cfg.resilience.circuit_breaker.failure_threshold = 0;
        cfg.sandbox.timeout_secs = 0;
        let warnings = cfg.validate();
        assert_eq!(
            warnings
                .iter()
                .filter(|w| w.level == WarnLevel::Error)
                .count(),
            2
        );
    }

    #[test]
    fn validate_flags_excessive_retries() {
        let mut cfg = AnalystConfig::default();
        cfg.resilience.retry.max_attempts = 11;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains(">10 is unusual")));
    }

    #[test]
    fn validate_unknown_task_references() {
        let mut cfg = AnalystConfig::default();
        cfg.selection.default_tasks.push("bogus".into());
        cfg.tasks.push(TaskDescriptor {
            id: "Bad-Id".into(),
            display_name: "Bad".into(),
            description: "x".into(),
            specialty_tags: vec![],
            keyword_tags: vec![],
            required_signals: vec![],
            dependencies: vec!["missing_dep".into()],
        });
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("unknown task 'bogus' in selection.default_tasks")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("invalid task id 'Bad-Id'")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("depends on unknown task 'missing_dep'")));
    }
}
