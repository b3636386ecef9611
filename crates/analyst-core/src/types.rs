use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// AnalysisRequest
// ---------------------------------------------------------------------------

/// One run's input. Created once and never mutated.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub dataset: Vec<u8>,
    pub filename: String,
    pub question: String,
}

impl AnalysisRequest {
    pub fn new(dataset: Vec<u8>, filename: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            dataset,
            filename: filename.into(),
            question: question.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnType / DataDigest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Datetime,
    String,
    Unknown,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Datetime => "datetime",
            ColumnType::String => "string",
            ColumnType::Unknown => "unknown",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn is_categorical(self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Boolean)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact structural summary of a dataset. Computed once at ingest and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDigest {
    pub filename: String,
    pub column_names: Vec<String>,
    /// Parallel to `column_names`.
    pub inferred_types: Vec<ColumnType>,
    pub row_count: usize,
    /// Missing-value count per column name.
    pub missing_values: BTreeMap<String, usize>,
    pub sample_rows: Vec<Vec<String>>,
}

impl DataDigest {
    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnType)> + '_ {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.inferred_types.iter().copied())
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns().find(|(n, _)| *n == name).map(|(_, t)| t)
    }

    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }
}

// ---------------------------------------------------------------------------
// DataSignal
// ---------------------------------------------------------------------------

/// Coarse dataset characteristics that tasks can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSignal {
    Customer,
    Temporal,
    Monetary,
    Geographic,
    MixedTypes,
}

impl DataSignal {
    pub fn all() -> &'static [DataSignal] {
        &[
            DataSignal::Customer,
            DataSignal::Temporal,
            DataSignal::Monetary,
            DataSignal::Geographic,
            DataSignal::MixedTypes,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataSignal::Customer => "customer",
            DataSignal::Temporal => "temporal",
            DataSignal::Monetary => "monetary",
            DataSignal::Geographic => "geographic",
            DataSignal::MixedTypes => "mixed_types",
        }
    }
}

impl fmt::Display for DataSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskDescriptor
// ---------------------------------------------------------------------------

/// A pluggable analysis task. Holds metadata only; the analysis code itself
/// is generated per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: String,
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub specialty_tags: Vec<String>,
    #[serde(default)]
    pub keyword_tags: Vec<String>,
    #[serde(default)]
    pub required_signals: Vec<DataSignal>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TaskDescriptor {
    /// Specialty and keyword tags together, lowercased.
    pub fn tags(&self) -> impl Iterator<Item = String> + '_ {
        self.specialty_tags
            .iter()
            .chain(self.keyword_tags.iter())
            .map(|t| t.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Image,
    Table,
    Report,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Image => "image",
            ArtifactKind::Table => "table",
            ArtifactKind::Report => "report",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactContent {
    /// Image bytes, base64 encoded.
    Base64 { mime: String, data: String },
    Text { text: String },
    OmittedForSize { limit_bytes: u64 },
    /// Not decodable as text.
    Binary,
}

impl ArtifactContent {
    pub fn is_inline(&self) -> bool {
        matches!(self, ArtifactContent::Base64 { .. } | ArtifactContent::Text { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub filename: String,
    pub byte_size: u64,
    pub kind: ArtifactKind,
    pub content: ArtifactContent,
}

// ---------------------------------------------------------------------------
// TaskResult
// ---------------------------------------------------------------------------

/// Outcome of one selected task. Every selected task gets exactly one,
/// failures included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    /// stdout, then stderr after a separator line when stderr is non-empty.
    pub stdout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The generated code was the built-in fallback summary.
    #[serde(default)]
    pub fallback_code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

pub const CANCELLED_MESSAGE: &str = "cancelled";

impl TaskResult {
    pub fn failed(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            stdout: String::new(),
            error_message: Some(message.into()),
            duration_ms: 0,
            artifacts: Vec::new(),
            insight: None,
            description: None,
            fallback_code: false,
            work_dir: None,
        }
    }

    pub fn cancelled(task_id: impl Into<String>) -> Self {
        Self::failed(task_id, CANCELLED_MESSAGE)
    }

    pub fn is_cancelled(&self) -> bool {
        !self.success && self.error_message.as_deref() == Some(CANCELLED_MESSAGE)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_column_lookup() {
        let d = DataDigest {
            filename: "x.csv".into(),
            column_names: vec!["a".into(), "b".into()],
            inferred_types: vec![ColumnType::Integer, ColumnType::String],
            row_count: 0,
            missing_values: BTreeMap::new(),
            sample_rows: vec![],
        };
        assert_eq!(d.column_type("b"), Some(ColumnType::String));
        assert_eq!(d.column_type("c"), None);
        assert_eq!(d.column_count(), 2);
    }

    #[test]
    fn task_descriptor_yaml_defaults() {
        let yaml = "id: custom\ndisplay_name: Custom\ndescription: Does things\n";
        let t: TaskDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert!(t.dependencies.is_empty());
        assert!(t.required_signals.is_empty());
    }

    #[test]
    fn artifact_content_serializes_with_status_tag() {
        let v = serde_json::to_value(ArtifactContent::OmittedForSize { limit_bytes: 10 }).unwrap();
        assert_eq!(v["status"], "omitted_for_size");
        assert_eq!(v["limit_bytes"], 10);
        let v = serde_json::to_value(ArtifactContent::Binary).unwrap();
        assert_eq!(v["status"], "binary");
    }

    #[test]
    fn cancelled_result_is_a_failure() {
        let r = TaskResult::cancelled("t");
        assert!(!r.success);
        assert!(r.is_cancelled());
        assert!(!TaskResult::failed("t", "boom").is_cancelled());
    }
}
