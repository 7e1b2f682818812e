//! Parallel fan-out processing for batches of independent text items.
//!
//! This crate takes an ordered collection of text items, dispatches each to
//! a user-supplied [`Processor`] under a bounded worker pool, isolates
//! per-item failures so one bad item cannot abort the batch, and reduces
//! the results into two views: a flattened human-readable string and a
//! structured report with timing and success statistics.
//!
//! The typical entry point is [`BatchRunner`], which chains the input
//! normalizer, the worker sizing policy, the fan-out dispatcher, and the
//! result aggregator. Each stage is also usable on its own.

pub mod dispatch;
pub mod error;
pub mod input;
pub mod metrics;
pub mod process;
pub mod report;
pub mod runner;
pub mod task;
pub mod workers;

// Re-export commonly used types
pub use dispatch::{BatchId, DispatchConfig, Dispatcher};
pub use error::{Result, VolleyError};
pub use input::{RawInput, RecordSet, extract_text_values};
pub use process::{FnProcessor, MockProcessor, Processor};
pub use report::{BatchReport, ErrorReport, build_report, combine_results_as_string};
pub use runner::{BatchConfig, BatchDetails, BatchOutput, BatchRunner};
pub use task::{ProcessorKind, TaskResult};
pub use workers::{MAX_WORKERS, optimal_workers, parse_max_workers};

#[cfg(feature = "metrics")]
pub use metrics::VolleyMetrics;
