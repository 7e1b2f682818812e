//! Batch runner: the orchestration-facing chain from raw input to the two
//! aggregated outputs.
//!
//! One `run` call walks normalize -> size -> dispatch -> aggregate and
//! returns both the combined string and the structured report. The
//! processor is an explicit dependency - no ambient registries - and all
//! knobs live in [`BatchConfig`], resolved once at batch start.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::dispatch::{DispatchConfig, Dispatcher};
use crate::input::{RawInput, extract_text_values};
use crate::process::Processor;
use crate::report::{BatchReport, ErrorReport, build_report, combine_results_as_string};
use crate::task::ProcessorKind;
use crate::workers::{optimal_workers, parse_max_workers};

/// Configuration for one batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Which processor variant this batch belongs to; shapes the report.
    pub processor_type: ProcessorKind,

    /// Raw caller worker-count hint. Parsed once per batch: a positive
    /// parsable value wins, anything else falls back to the size heuristic.
    pub max_workers: Option<String>,

    /// Separator for the combined-string output.
    pub separator: String,

    /// Per-task timeout in milliseconds (see [`DispatchConfig`]).
    pub task_timeout_ms: Option<u64>,

    /// Overall batch deadline in milliseconds (see [`DispatchConfig`]).
    pub batch_deadline_ms: Option<u64>,

    /// Extra key/value pairs merged into the serialized report; may
    /// overwrite computed keys.
    pub additional_stats: Option<Map<String, Value>>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            processor_type: ProcessorKind::Generic,
            max_workers: None,
            separator: "\n".to_string(),
            task_timeout_ms: None,
            batch_deadline_ms: None,
            additional_stats: None,
        }
    }
}

impl BatchConfig {
    /// Resolve the worker count for a batch of `item_count` items.
    ///
    /// The caller hint takes precedence when present and positive after
    /// parsing; otherwise the tiered size heuristic applies. An unparsable
    /// hint falls back to the heuristic's output, not a fixed constant.
    pub fn resolve_workers(&self, item_count: usize) -> usize {
        parse_max_workers(self.max_workers.as_deref(), optimal_workers(item_count))
    }
}

/// Structured half of a batch's output: a report, or the error shape when
/// the batch aborted before dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchDetails {
    Report(Box<BatchReport>),
    Error(ErrorReport),
}

impl BatchDetails {
    pub fn as_report(&self) -> Option<&BatchReport> {
        match self {
            BatchDetails::Report(report) => Some(report),
            BatchDetails::Error(_) => None,
        }
    }
}

/// The two aggregated outputs of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutput {
    /// Human-readable flattened view.
    pub combined: String,
    /// Structured view for programmatic consumption.
    pub detailed: BatchDetails,
}

/// Runs batches against a processor.
///
/// # Example
/// ```ignore
/// let runner = BatchRunner::new(Arc::new(MockProcessor::new()))
///     .with_config(BatchConfig {
///         processor_type: ProcessorKind::Query,
///         ..Default::default()
///     });
/// let output = runner.run(RawInput::from_json(r#"{"text":["a","b"]}"#)?).await;
/// ```
pub struct BatchRunner<P: Processor> {
    processor: Arc<P>,
    config: BatchConfig,
    #[cfg(feature = "metrics")]
    metrics: Option<crate::metrics::VolleyMetrics>,
}

impl<P: Processor + 'static> BatchRunner<P> {
    pub fn new(processor: Arc<P>) -> Self {
        Self {
            processor,
            config: BatchConfig::default(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a metrics registry; batch and task completions will be
    /// recorded to it.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: crate::metrics::VolleyMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run one batch end to end.
    ///
    /// Normalization cannot fail on an already-parsed input, so this always
    /// produces a report - a batch with no extractable text simply yields
    /// an empty combined string and all-zero statistics.
    pub async fn run(&self, input: RawInput) -> BatchOutput {
        let items = extract_text_values(&input);
        let worker_count = self.config.resolve_workers(items.len());

        let dispatcher = Dispatcher::new(DispatchConfig {
            task_timeout_ms: self.config.task_timeout_ms,
            batch_deadline_ms: self.config.batch_deadline_ms,
        });
        #[cfg(feature = "metrics")]
        let dispatcher = match &self.metrics {
            Some(metrics) => dispatcher.with_metrics(metrics.clone()),
            None => dispatcher,
        };

        tracing::info!(
            batch_id = %dispatcher.batch_id(),
            item_count = items.len(),
            worker_count,
            processor_type = %self.config.processor_type,
            "Running batch"
        );

        let results = dispatcher
            .dispatch(items, self.processor.clone(), worker_count)
            .await;

        let combined = combine_results_as_string(&results, &self.config.separator);
        let report = build_report(
            results,
            self.config.processor_type,
            self.config.additional_stats.clone(),
        );

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_batch(true);
        }

        BatchOutput {
            combined,
            detailed: BatchDetails::Report(Box::new(report)),
        }
    }

    /// Run one batch from a raw JSON string.
    ///
    /// A parse failure is the one normalization-level fault: the batch
    /// aborts before dispatch, the combined output degrades to an error
    /// string, and the structured output degrades to the
    /// `{error, timestamp}` shape.
    pub async fn run_json(&self, raw: &str) -> BatchOutput {
        match RawInput::from_json(raw) {
            Ok(input) => self.run(input).await,
            Err(fault) => {
                tracing::warn!(error = %fault, "Batch input failed normalization");
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.metrics {
                    metrics.record_batch(false);
                }
                let message = match &fault {
                    crate::error::VolleyError::Normalization(message) => message.clone(),
                    other => other.to_string(),
                };
                BatchOutput {
                    combined: format!("Error processing DataFrame: {}", message),
                    detailed: BatchDetails::Error(ErrorReport::new(message)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{FnProcessor, MockProcessor};
    use crate::task::TaskResult;
    use serde_json::json;

    #[tokio::test]
    async fn test_run_produces_both_outputs() {
        let runner = BatchRunner::new(Arc::new(MockProcessor::new()));
        let output = runner
            .run(RawInput::from(json!({"data": [{"text": "a"}, {"text": "b"}]})))
            .await;

        let report = output.detailed.as_report().expect("report");
        assert_eq!(report.total_processed, 2);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 0);

        let mut lines: Vec<&str> = output.combined.split('\n').collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["Answer to 'a'", "Answer to 'b'"]);
    }

    #[tokio::test]
    async fn test_run_empty_input() {
        let runner = BatchRunner::new(Arc::new(MockProcessor::new()));
        let output = runner.run(RawInput::from(json!({"data": []}))).await;

        assert_eq!(output.combined, "");
        let report = output.detailed.as_report().expect("report");
        assert_eq!(report.total_processed, 0);
        assert_eq!(report.successful + report.failed, 0);
    }

    #[tokio::test]
    async fn test_query_variant_combined_format() {
        let processor = FnProcessor::new(|query: String| async move {
            Ok::<_, crate::error::VolleyError>(TaskResult::with_answer(
                &query,
                format!("A({query})"),
            ))
        });
        let runner = BatchRunner::new(Arc::new(processor)).with_config(BatchConfig {
            processor_type: ProcessorKind::Query,
            max_workers: Some("1".to_string()),
            ..Default::default()
        });

        let output = runner.run(RawInput::from(json!(["q1", "q2"]))).await;
        // Completion order is unspecified; accept either interleaving.
        let forward = "Q: q1\nA: A(q1)\nQ: q2\nA: A(q2)";
        let reverse = "Q: q2\nA: A(q2)\nQ: q1\nA: A(q1)";
        assert!(
            output.combined == forward || output.combined == reverse,
            "got: {}",
            output.combined
        );

        let report = output.detailed.as_report().expect("report");
        assert_eq!(report.total_queries, Some(2));
    }

    #[tokio::test]
    async fn test_run_json_degrades_on_parse_failure() {
        let runner = BatchRunner::new(Arc::new(MockProcessor::new()));
        let output = runner.run_json("{definitely not json").await;

        assert!(
            output.combined.starts_with("Error processing DataFrame: "),
            "got: {}",
            output.combined
        );
        match output.detailed {
            BatchDetails::Error(report) => assert!(!report.error.is_empty()),
            BatchDetails::Report(_) => panic!("expected error details"),
        }
    }

    #[tokio::test]
    async fn test_worker_hint_resolution() {
        let config = BatchConfig {
            max_workers: Some("2".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_workers(100), 2);

        let config = BatchConfig {
            max_workers: Some("not a number".to_string()),
            ..Default::default()
        };
        // Unparsable hint falls back to the heuristic for this batch size.
        assert_eq!(config.resolve_workers(6), 4);

        let config = BatchConfig::default();
        assert_eq!(config.resolve_workers(3), 3);
    }

    #[tokio::test]
    async fn test_custom_separator() {
        let runner = BatchRunner::new(Arc::new(MockProcessor::new())).with_config(BatchConfig {
            separator: "\n---\n".to_string(),
            max_workers: Some("1".to_string()),
            ..Default::default()
        });
        let output = runner.run(RawInput::from(json!(["a", "b"]))).await;
        let mut parts: Vec<&str> = output.combined.split("\n---\n").collect();
        parts.sort_unstable();
        assert_eq!(parts, vec!["Answer to 'a'", "Answer to 'b'"]);
    }

    #[tokio::test]
    async fn test_additional_stats_reach_serialized_report() {
        let mut extra = Map::new();
        extra.insert("pipeline".to_string(), json!("nightly"));

        let runner = BatchRunner::new(Arc::new(MockProcessor::new())).with_config(BatchConfig {
            additional_stats: Some(extra),
            ..Default::default()
        });
        let output = runner.run(RawInput::from("solo")).await;
        let value = serde_json::to_value(&output.detailed).unwrap();
        assert_eq!(value["pipeline"], json!("nightly"));
        assert_eq!(value["total_processed"], json!(1));
    }
}
