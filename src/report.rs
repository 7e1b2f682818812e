//! Result aggregation: reducing a batch's task results into a combined
//! string and a structured report.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::task::{ProcessorKind, TaskResult};

/// Round to 3 decimal places for presentation stability.
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Combine a batch's results into a single string.
///
/// The format is a batch-level decision made on the first record's shape
/// (records within one batch are assumed homogeneous):
/// 1. records with a `response` payload: responses joined with `separator`
/// 2. records with an `answer` payload: `"Q: {query}\nA: {answer}"` per
///    record, joined with `separator`
/// 3. anything else: each record's compact JSON form, joined
///
/// An empty batch yields an empty string.
pub fn combine_results_as_string(results: &[TaskResult], separator: &str) -> String {
    let Some(first) = results.first() else {
        return String::new();
    };

    if first.response.is_some() {
        return results
            .iter()
            .map(|r| r.response.clone().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(separator);
    }

    if first.answer.is_some() {
        return results
            .iter()
            .map(|r| {
                format!(
                    "Q: {}\nA: {}",
                    r.query,
                    r.answer.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(separator);
    }

    results
        .iter()
        .map(|r| serde_json::to_string(r).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Aggregated statistics over one batch's task results.
///
/// Built by [`build_report`]; read-only thereafter. Serializes with any
/// caller-supplied `extra` entries overwriting the computed keys (see
/// [`BatchReport::to_value`]).
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// The raw per-item records the statistics were derived from.
    pub results: Vec<TaskResult>,
    pub total_processed: usize,
    /// Records without an error. `successful + failed == total_processed`.
    pub successful: usize,
    pub failed: usize,
    /// Sum of per-record processing times, rounded to 3 decimals.
    pub total_processing_time: f64,
    /// Zero when the batch was empty.
    pub average_processing_time: f64,
    pub processor_type: ProcessorKind,
    /// Capture time of aggregation, not of any individual task.
    pub timestamp: DateTime<Utc>,
    /// Present only for the query variant; equals `total_processed`.
    pub total_queries: Option<usize>,
    /// Tool name -> occurrence count. Present only for variants that track
    /// tool calls (possibly empty for those).
    pub tool_usage: Option<HashMap<String, usize>>,
    /// Caller-supplied extra statistics, merged in on serialization.
    pub extra: Map<String, Value>,
}

impl BatchReport {
    /// Serialized form of the report, with `extra` entries overwriting any
    /// computed key of the same name.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "results".to_string(),
            serde_json::to_value(&self.results).unwrap_or(Value::Null),
        );
        map.insert("total_processed".to_string(), self.total_processed.into());
        map.insert("successful".to_string(), self.successful.into());
        map.insert("failed".to_string(), self.failed.into());
        map.insert(
            "total_processing_time".to_string(),
            serde_json::to_value(self.total_processing_time).unwrap_or(Value::Null),
        );
        map.insert(
            "average_processing_time".to_string(),
            serde_json::to_value(self.average_processing_time).unwrap_or(Value::Null),
        );
        map.insert(
            "processor_type".to_string(),
            Value::String(self.processor_type.to_string()),
        );
        map.insert(
            "timestamp".to_string(),
            Value::String(self.timestamp.to_rfc3339()),
        );
        if let Some(total_queries) = self.total_queries {
            map.insert("total_queries".to_string(), total_queries.into());
        }
        if let Some(tool_usage) = &self.tool_usage {
            map.insert(
                "tool_usage".to_string(),
                serde_json::to_value(tool_usage).unwrap_or(Value::Null),
            );
        }
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

impl Serialize for BatchReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Build the structured report for a batch.
///
/// Never fails: missing numeric fields count as zero, and an empty result
/// sequence yields all-zero statistics. `additional_stats` entries are
/// carried into the serialized report and may overwrite computed keys.
pub fn build_report(
    results: Vec<TaskResult>,
    processor_type: ProcessorKind,
    additional_stats: Option<Map<String, Value>>,
) -> BatchReport {
    let total_processed = results.len();
    let successful = results.iter().filter(|r| r.error.is_none()).count();
    let failed = total_processed - successful;
    let total_time: f64 = results.iter().map(|r| r.processing_time).sum();
    let average_time = if total_processed > 0 {
        total_time / total_processed as f64
    } else {
        0.0
    };

    let tool_usage = processor_type.tracks_tools().then(|| {
        let mut tally: HashMap<String, usize> = HashMap::new();
        for result in &results {
            for tool in &result.tools_called {
                *tally.entry(tool.clone()).or_insert(0) += 1;
            }
        }
        tally
    });

    let total_queries = (processor_type == ProcessorKind::Query).then_some(total_processed);

    BatchReport {
        results,
        total_processed,
        successful,
        failed,
        total_processing_time: round3(total_time),
        average_processing_time: round3(average_time),
        processor_type,
        timestamp: Utc::now(),
        total_queries,
        tool_usage,
        extra: additional_stats.unwrap_or_default(),
    }
}

/// Structured error shape returned when a batch aborts before dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            timestamp: Utc::now(),
        }
    }
}
