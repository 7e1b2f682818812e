//! Per-item result records and processor variant tags.

use serde::{Deserialize, Serialize};

/// Tag identifying which processor variant produced a batch.
///
/// Drives the report shape: the query variant adds a `total_queries` field,
/// and the tool-using variants add a `tool_usage` tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    Simple,
    Parallel,
    Integrated,
    Query,
    ParallelAgents,
    Generic,
}

impl ProcessorKind {
    /// Variants whose processing functions record tool calls, and whose
    /// reports therefore carry a tool-usage tally.
    pub fn tracks_tools(&self) -> bool {
        matches!(self, ProcessorKind::Integrated | ProcessorKind::Parallel)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::Simple => "simple",
            ProcessorKind::Parallel => "parallel",
            ProcessorKind::Integrated => "integrated",
            ProcessorKind::Query => "query",
            ProcessorKind::ParallelAgents => "parallel_agents",
            ProcessorKind::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of processing one input item.
///
/// Created exactly once, either by the processing function (success path) or
/// by the dispatcher's fault-isolation path (failure path), and immutable
/// thereafter. The constructors keep the `success == error.is_none()`
/// invariant; prefer them over struct literals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The input item this record belongs to. Results are gathered in
    /// completion order, so callers needing input order re-key on this.
    pub query: String,

    /// Response payload, or a diagnostic string on the failure path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// Answer payload used by the query variant (paired with `query` in the
    /// combined-string output).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    pub success: bool,

    /// Fault message when the dispatcher synthesized this record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Names of tools invoked while processing this item.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_called: Vec<String>,

    /// Names of agents invoked while processing this item.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents_called: Vec<String>,

    /// Wall-clock processing time in seconds. Zero for synthesized failures.
    #[serde(default)]
    pub processing_time: f64,
}

impl TaskResult {
    /// Successful result carrying a `response` payload.
    pub fn answered(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: Some(response.into()),
            answer: None,
            success: true,
            error: None,
            tools_called: Vec::new(),
            agents_called: Vec::new(),
            processing_time: 0.0,
        }
    }

    /// Successful result carrying an `answer` payload (query variant).
    pub fn with_answer(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: None,
            answer: Some(answer.into()),
            success: true,
            error: None,
            tools_called: Vec::new(),
            agents_called: Vec::new(),
            processing_time: 0.0,
        }
    }

    /// Standardized failure record, as synthesized by the dispatcher when a
    /// processing function faults for one item.
    pub fn failed(query: impl Into<String>, error_message: impl Into<String>) -> Self {
        let error_message = error_message.into();
        Self {
            query: query.into(),
            response: Some(format!("Error processing query: {}", error_message)),
            answer: None,
            success: false,
            error: Some(error_message),
            tools_called: Vec::new(),
            agents_called: Vec::new(),
            processing_time: 0.0,
        }
    }

    pub fn with_tools(mut self, tools_called: Vec<String>) -> Self {
        self.tools_called = tools_called;
        self
    }

    pub fn with_agents(mut self, agents_called: Vec<String>) -> Self {
        self.agents_called = agents_called;
        self
    }

    pub fn with_time(mut self, processing_time: f64) -> Self {
        self.processing_time = processing_time;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_shape() {
        let result = TaskResult::failed("what is rust", "connection refused");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("connection refused"));
        assert_eq!(
            result.response.as_deref(),
            Some("Error processing query: connection refused")
        );
        assert!(result.tools_called.is_empty());
        assert_eq!(result.processing_time, 0.0);
    }

    #[test]
    fn test_success_invariant() {
        let result = TaskResult::answered("q", "r").with_time(0.25);
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.processing_time, 0.25);
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_value(TaskResult::with_answer("q", "a")).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("response"));
        assert!(!obj.contains_key("error"));
        assert!(!obj.contains_key("tools_called"));
        assert_eq!(obj["answer"], "a");
    }
}
