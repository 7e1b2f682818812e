//! The processing-function seam between the dispatcher and the surrounding
//! system.
//!
//! Real processors (tool-calling agents, model clients) live outside this
//! crate; the dispatcher only sees the [`Processor`] trait. A mock
//! implementation is provided for tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Result, VolleyError};
use crate::task::TaskResult;

/// A user-supplied processing function: one text item in, one result out.
///
/// Implementations must be re-entrant across concurrent invocations - the
/// dispatcher runs one call per in-flight item and provides no
/// synchronization of its own. Errors returned here (and panics) are
/// captured per item by the dispatcher's fault-isolation path and never
/// abort sibling tasks.
///
/// # Example
/// ```ignore
/// struct EchoProcessor;
///
/// #[async_trait]
/// impl Processor for EchoProcessor {
///     async fn process(&self, query: &str) -> Result<TaskResult> {
///         Ok(TaskResult::answered(query, format!("echo: {query}")))
///     }
/// }
/// ```
#[async_trait]
pub trait Processor: Send + Sync {
    /// Process one input item to completion.
    async fn process(&self, query: &str) -> Result<TaskResult>;
}

/// Adapter turning an async closure into a [`Processor`].
pub struct FnProcessor<F> {
    function: F,
}

impl<F> FnProcessor<F> {
    pub fn new(function: F) -> Self {
        Self { function }
    }
}

#[async_trait]
impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskResult>> + Send,
{
    async fn process(&self, query: &str) -> Result<TaskResult> {
        (self.function)(query.to_string()).await
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

/// A scripted reply for one query.
enum MockReply {
    Ok(TaskResult),
    Err(String),
    Panic(String),
}

/// Mock processor for testing.
///
/// Replies can be scripted per query (FIFO when multiple are queued for the
/// same query); unscripted queries get a canned answer. An optional
/// artificial latency makes concurrency observable, and the mock records
/// every call plus the high-water mark of concurrent in-flight calls.
#[derive(Clone, Default)]
pub struct MockProcessor {
    replies: Arc<Mutex<HashMap<String, Vec<MockReply>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    latency: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add artificial per-call latency (applies to every query).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a successful reply for a query.
    pub fn add_response(&self, query: &str, result: TaskResult) {
        self.replies
            .lock()
            .entry(query.to_string())
            .or_default()
            .push(MockReply::Ok(result));
    }

    /// Queue a failure for a query.
    pub fn fail_on(&self, query: &str, error_message: &str) {
        self.replies
            .lock()
            .entry(query.to_string())
            .or_default()
            .push(MockReply::Err(error_message.to_string()));
    }

    /// Queue a panic for a query, for exercising the dispatcher's panic
    /// isolation.
    pub fn panic_on(&self, query: &str, message: &str) {
        self.replies
            .lock()
            .entry(query.to_string())
            .or_default()
            .push(MockReply::Panic(message.to_string()));
    }

    /// Queries processed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of concurrent in-flight calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Relaxed)
    }

    fn take_reply(&self, query: &str) -> Option<MockReply> {
        let mut replies = self.replies.lock();
        let queue = replies.get_mut(query)?;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }
}

#[async_trait]
impl Processor for MockProcessor {
    async fn process(&self, query: &str) -> Result<TaskResult> {
        self.calls.lock().push(query.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = scopeguard::guard((), |_| {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        let started = std::time::Instant::now();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.take_reply(query) {
            Some(MockReply::Ok(result)) => Ok(result),
            Some(MockReply::Err(message)) => Err(VolleyError::Task(message)),
            Some(MockReply::Panic(message)) => panic!("{}", message),
            None => Ok(TaskResult::answered(query, format!("Answer to '{query}'"))
                .with_time(started.elapsed().as_secs_f64())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_default_reply() {
        let mock = MockProcessor::new();
        let result = mock.process("what is rust").await.unwrap();
        assert!(result.success);
        assert_eq!(result.response.as_deref(), Some("Answer to 'what is rust'"));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.calls(), vec!["what is rust"]);
    }

    #[tokio::test]
    async fn test_mock_scripted_replies_fifo() {
        let mock = MockProcessor::new();
        mock.add_response("q", TaskResult::answered("q", "first"));
        mock.add_response("q", TaskResult::answered("q", "second"));

        let first = mock.process("q").await.unwrap();
        let second = mock.process("q").await.unwrap();
        assert_eq!(first.response.as_deref(), Some("first"));
        assert_eq!(second.response.as_deref(), Some("second"));

        // Queue exhausted - back to the default reply.
        let third = mock.process("q").await.unwrap();
        assert_eq!(third.response.as_deref(), Some("Answer to 'q'"));
    }

    #[tokio::test]
    async fn test_mock_scripted_failure() {
        let mock = MockProcessor::new();
        mock.fail_on("bad", "simulated fault");
        let err = mock.process("bad").await.unwrap_err();
        assert!(matches!(err, VolleyError::Task(_)));
        assert_eq!(err.to_string(), "Task failed: simulated fault");
    }

    #[tokio::test]
    async fn test_fn_processor_adapter() {
        let processor = FnProcessor::new(|query: String| async move {
            Ok::<_, VolleyError>(TaskResult::with_answer(&query, format!("A({query})")))
        });
        let result = processor.process("x").await.unwrap();
        assert_eq!(result.answer.as_deref(), Some("A(x)"));
    }
}
