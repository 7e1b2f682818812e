//! Prometheus metrics for batch dispatch monitoring.
//!
//! Everything here is behind the `metrics` feature. The registry tracks:
//! - **Gauge**: tasks currently in flight
//! - **Counters**: task completions by status, batches dispatched
//! - **Histogram**: per-task processing duration

#[cfg(feature = "metrics")]
use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};
#[cfg(feature = "metrics")]
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::error::Result;

/// Prometheus metrics registry for the fan-out dispatcher.
#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct VolleyMetrics {
    registry: Registry,
    tasks_in_flight: Gauge,
    tasks_total: CounterVec,
    batches_total: CounterVec,
    task_duration_seconds: Histogram,
}

#[cfg(feature = "metrics")]
impl VolleyMetrics {
    /// Create a new metrics instance registered against `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics fail to register (e.g. duplicate
    /// registration against the same registry).
    pub fn new(registry: Registry) -> Result<Self> {
        let tasks_in_flight = Gauge::with_opts(Opts::new(
            "volley_tasks_in_flight",
            "Number of tasks currently holding a worker-pool slot",
        ))
        .map_err(|e| anyhow::anyhow!("Failed to create tasks_in_flight gauge: {}", e))?;

        let tasks_total = CounterVec::new(
            Opts::new(
                "volley_tasks_total",
                "Total number of tasks completed by status",
            ),
            &["status"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create tasks_total counter: {}", e))?;

        let batches_total = CounterVec::new(
            Opts::new(
                "volley_batches_total",
                "Total number of batches dispatched by outcome",
            ),
            &["outcome"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create batches_total counter: {}", e))?;

        let task_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "volley_task_duration_seconds",
            "Per-task processing duration in seconds",
        ))
        .map_err(|e| anyhow::anyhow!("Failed to create task_duration histogram: {}", e))?;

        registry
            .register(Box::new(tasks_in_flight.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register tasks_in_flight: {}", e))?;
        registry
            .register(Box::new(tasks_total.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register tasks_total: {}", e))?;
        registry
            .register(Box::new(batches_total.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register batches_total: {}", e))?;
        registry
            .register(Box::new(task_duration_seconds.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register task_duration_seconds: {}", e))?;

        Ok(Self {
            registry,
            tasks_in_flight,
            tasks_total,
            batches_total,
            task_duration_seconds,
        })
    }

    /// Record one task completion.
    pub fn record_task(&self, success: bool, duration: Duration) {
        let status = if success { "success" } else { "failed" };
        self.tasks_total.with_label_values(&[status]).inc();
        self.task_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Record one finished batch.
    pub fn record_batch(&self, completed: bool) {
        let outcome = if completed { "completed" } else { "error" };
        self.batches_total.with_label_values(&[outcome]).inc();
    }

    /// Update the in-flight gauge to the current value.
    pub fn set_tasks_in_flight(&self, count: usize) {
        self.tasks_in_flight.set(count as f64);
    }

    /// The underlying registry, for exposition by the host process.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
