use crate::types::{DataDigest, DataSignal, TaskDescriptor};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Helper macro for concise task definitions
// ---------------------------------------------------------------------------

macro_rules! task {
    (
        id: $id:expr,
        name: $name:expr,
        description: $desc:expr,
        specialty: [$($spec:expr),* $(,)?],
        keywords: [$($kw:expr),* $(,)?]
        $(, requires: [$($sig:expr),* $(,)?])?
        $(, depends_on: [$($dep:expr),* $(,)?])?
    ) => {
        TaskDescriptor {
            id: $id.to_string(),
            display_name: $name.to_string(),
            description: $desc.to_string(),
            specialty_tags: vec![$($spec.to_string()),*],
            keyword_tags: vec![$($kw.to_string()),*],
            required_signals: {
                #[allow(unused_mut)]
                let mut v: Vec<DataSignal> = Vec::new();
                $($(v.push($sig);)*)?
                v
            },
            dependencies: {
                #[allow(unused_mut)]
                let mut v: Vec<String> = Vec::new();
                $($(v.push($dep.to_string());)*)?
                v
            },
        }
    };
}

/// Tasks used when selection produces nothing.
pub const DEFAULT_TASKS: &[&str] = &["data_profiling", "correlation_analysis"];

// ---------------------------------------------------------------------------
// Built-in catalog
// ---------------------------------------------------------------------------

pub fn builtin_catalog() -> Vec<TaskDescriptor> {
    use DataSignal::*;

    vec![
        task!(
            id: "data_profiling",
            name: "Data Profiling",
            description: "Summarise every column: types, missing values, distributions, \
                          cardinality and obvious quality problems.",
            specialty: ["profiling", "data quality"],
            keywords: ["overview", "summary", "describe", "quality", "missing", "explore"]
        ),
        task!(
            id: "correlation_analysis",
            name: "Correlation Analysis",
            description: "Measure pairwise relationships between numeric columns and \
                          highlight the strongest correlations with a heatmap.",
            specialty: ["correlation", "statistics"],
            keywords: ["relationship", "correlate", "drivers", "impact", "factor"]
        ),
        task!(
            id: "customer_segmentation",
            name: "Customer Segmentation",
            description: "Cluster customers into behavioural segments and describe what \
                          distinguishes each segment.",
            specialty: ["segmentation", "clustering", "customer"],
            keywords: ["segment", "cluster", "persona", "group"],
            requires: [Customer],
            depends_on: ["data_profiling"]
        ),
        task!(
            id: "churn_prediction",
            name: "Churn Prediction",
            description: "Estimate which customers are likely to churn, using recency and \
                          activity features, and report the leading churn indicators.",
            specialty: ["churn", "retention", "customer"],
            keywords: ["churn", "attrition", "retention", "cancel", "leave", "lapse"],
            requires: [Customer],
            depends_on: ["data_profiling"]
        ),
        task!(
            id: "cohort_analysis",
            name: "Cohort Analysis",
            description: "Group customers by the period they first appear and track how \
                          each cohort behaves over time.",
            specialty: ["cohort", "retention"],
            keywords: ["cohort", "signup", "lifecycle", "over time"],
            requires: [Customer, Temporal],
            depends_on: ["data_profiling"]
        ),
        task!(
            id: "revenue_trends",
            name: "Revenue Trends",
            description: "Aggregate monetary columns over time and describe growth, \
                          seasonality and notable changes.",
            specialty: ["revenue", "trend"],
            keywords: ["revenue", "sales", "growth", "trend", "income", "spend"],
            requires: [Monetary, Temporal]
        ),
        task!(
            id: "time_series_forecast",
            name: "Time Series Forecast",
            description: "Forecast the main numeric series forward and report the \
                          expected range.",
            specialty: ["forecast", "time series"],
            keywords: ["forecast", "predict", "projection", "future", "next"],
            requires: [Temporal],
            depends_on: ["revenue_trends"]
        ),
        task!(
            id: "geographic_analysis",
            name: "Geographic Analysis",
            description: "Break metrics down by location and surface regional differences.",
            specialty: ["geographic", "location"],
            keywords: ["region", "country", "city", "state", "location", "geography"],
            requires: [Geographic]
        ),
        task!(
            id: "anomaly_detection",
            name: "Anomaly Detection",
            description: "Flag rows and periods whose values are unusual relative to the rest \
                          of the data.",
            specialty: ["anomaly", "outlier"],
            keywords: ["anomaly", "outlier", "unusual", "fraud", "spike"]
        ),
        task!(
            id: "rfm_analysis",
            name: "RFM Analysis",
            description: "Score customers on recency, frequency and monetary value and \
                          label the resulting tiers.",
            specialty: ["rfm", "customer value"],
            keywords: ["rfm", "recency", "frequency", "lifetime value", "loyal", "best customers"],
            requires: [Customer, Temporal, Monetary],
            depends_on: ["customer_segmentation"]
        ),
    ]
}

// ---------------------------------------------------------------------------
// Scoring helpers on TaskDescriptor
// ---------------------------------------------------------------------------

impl TaskDescriptor {
    /// No required signals, or every required signal is present.
    pub fn is_compatible(&self, signals: &BTreeSet<DataSignal>) -> bool {
        self.required_signals.iter().all(|s| signals.contains(s))
    }

    /// Any tag appears in the question text (case-insensitive).
    pub fn is_relevant(&self, question: &str) -> bool {
        let q = question.to_lowercase();
        self.tags().any(|t| !t.is_empty() && q.contains(&t))
    }

    /// Local keyword/column heuristic in `[0, 1]`.
    ///
    /// +0.4 per tag found in the question, +0.15 per tag found in a column
    /// name, +0.1 when compatible with the dataset signals.
    pub fn relevance_score(
        &self,
        question: &str,
        digest: &DataDigest,
        signals: &BTreeSet<DataSignal>,
    ) -> f64 {
        let q = question.to_lowercase();
        let columns: Vec<String> = digest.column_names.iter().map(|c| c.to_lowercase()).collect();
        let mut score = 0.0;
        for tag in self.tags().filter(|t| !t.is_empty()) {
            if q.contains(&tag) {
                score += 0.4;
            }
            if columns.iter().any(|c| c.contains(&tag)) {
                score += 0.15;
            }
        }
        if self.is_compatible(signals) {
            score += 0.1;
        }
        f64::min(score, 1.0)
    }
}

// ---------------------------------------------------------------------------
// TaskCatalog
// ---------------------------------------------------------------------------

/// Static registration table of tasks, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    tasks: BTreeMap<String, TaskDescriptor>,
}

impl TaskCatalog {
    pub fn builtin() -> Self {
        Self::from_tasks(builtin_catalog())
    }

    pub fn from_tasks(tasks: impl IntoIterator<Item = TaskDescriptor>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Add tasks, replacing any existing task with the same id.
    pub fn with_overrides(mut self, extra: &[TaskDescriptor]) -> Self {
        for t in extra {
            self.tasks.insert(t.id.clone(), t.clone());
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&TaskDescriptor> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Tasks in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Declared dependencies of each listed task. Unknown ids map to no
    /// dependencies.
    pub fn dependency_map(&self, ids: &[String]) -> BTreeMap<String, Vec<String>> {
        ids.iter()
            .map(|id| {
                let deps = self
                    .get(id)
                    .map(|t| t.dependencies.clone())
                    .unwrap_or_default();
                (id.clone(), deps)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
