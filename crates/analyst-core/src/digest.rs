use crate::error::{AnalystError, Result};
use crate::types::{ColumnType, DataDigest};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub const SAMPLE_ROWS: usize = 5;

const MISSING_TOKENS: &[&str] = &["", "na", "n/a", "null", "nan", "none"];

/// Turns raw dataset bytes into a [`DataDigest`].
pub trait DigestProvider: Send + Sync {
    fn compute(&self, bytes: &[u8], filename: &str) -> Result<DataDigest>;
}

/// Default provider for delimited text and JSON record files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularDigester;

impl DigestProvider for TabularDigester {
    fn compute(&self, bytes: &[u8], filename: &str) -> Result<DataDigest> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let (columns, rows) = match ext.as_str() {
            "csv" | "txt" => read_delimited(bytes, b',')?,
            "tsv" => read_delimited(bytes, b'\t')?,
            "json" => read_json_records(bytes)?,
            _ => return Err(AnalystError::UnsupportedFileType(filename.to_string())),
        };

        if columns.is_empty() || columns.iter().all(|c| c.trim().is_empty()) {
            return Err(AnalystError::DatasetParse("dataset has no columns".into()));
        }

        Ok(build_digest(filename, columns, rows))
    }
}

fn read_delimited(bytes: &[u8], delimiter: u8) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| AnalystError::DatasetParse(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| AnalystError::DatasetParse(format!("row {}: {e}", i + 1)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

fn read_json_records(bytes: &[u8]) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| AnalystError::DatasetParse(e.to_string()))?;
    let records = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AnalystError::DatasetParse(
                    "JSON object has no \"records\" array".into(),
                ))
            }
        },
        _ => {
            return Err(AnalystError::DatasetParse(
                "expected an array of objects".into(),
            ))
        }
    };

    let mut columns: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(records.len());
    for (i, rec) in records.into_iter().enumerate() {
        let Value::Object(obj) = rec else {
            return Err(AnalystError::DatasetParse(format!(
                "record {} is not an object",
                i + 1
            )));
        };
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let rows = objects
        .iter()
        .map(|obj| {
            columns
                .iter()
                .map(|c| obj.get(c).map(json_cell).unwrap_or_default())
                .collect()
        })
        .collect();
    Ok((columns, rows))
}

fn json_cell(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_digest(filename: &str, columns: Vec<String>, rows: Vec<Vec<String>>) -> DataDigest {
    let mut inferred_types = Vec::with_capacity(columns.len());
    let mut missing_values = BTreeMap::new();

    for (idx, name) in columns.iter().enumerate() {
        let cells: Vec<&str> = rows
            .iter()
            .map(|r| r.get(idx).map(String::as_str).unwrap_or(""))
            .collect();
        let missing = cells.iter().filter(|c| is_missing(c)).count();
        missing_values.insert(name.clone(), missing);
        inferred_types.push(infer_column_type(&cells));
    }

    let sample_rows = rows.iter().take(SAMPLE_ROWS).cloned().collect();
    DataDigest {
        filename: filename.to_string(),
        column_names: columns,
        inferred_types,
        row_count: rows.len(),
        missing_values,
        sample_rows,
    }
}

pub fn is_missing(cell: &str) -> bool {
    let t = cell.trim();
    MISSING_TOKENS.iter().any(|m| t.eq_ignore_ascii_case(m))
}

/// Narrowest type every non-missing cell fits. No values at all → `Unknown`.
pub fn infer_column_type(cells: &[&str]) -> ColumnType {
    let values: Vec<&str> = cells
        .iter()
        .filter(|c| !is_missing(c))
        .map(|c| c.trim())
        .collect();
    if values.is_empty() {
        return ColumnType::Unknown;
    }
    if values.iter().all(|v| v.parse::<i64>().is_ok()) {
        ColumnType::Integer
    } else if values.iter().all(|v| v.parse::<f64>().is_ok()) {
        ColumnType::Float
    } else if values
        .iter()
        .all(|v| v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false"))
    {
        ColumnType::Boolean
    } else if values.iter().all(|v| is_datetime(v)) {
        ColumnType::Datetime
    } else {
        ColumnType::String
    }
}

fn is_datetime(v: &str) -> bool {
    DateTime::parse_from_rfc3339(v).is_ok()
        || NaiveDate::parse_from_str(v, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(v, "%m/%d/%Y").is_ok()
}
