//! Pipeline Metrics Collection
//!
//! Counters for job outcomes, repairs, refunds and upstream token usage.
//! Thread-safe for concurrent background jobs.
//!
//! ## Usage
//!
//! ```ignore
//! let metrics = create_shared_metrics();
//! metrics.record_submitted();
//! metrics.record_failure(FailureClass::NoCapacity);
//! println!("{}", metrics.summary().display());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::ai::provider::LlmResponse;
use crate::types::FailureClass;

// =============================================================================
// Metrics Collector
// =============================================================================

/// Thread-safe metrics collector for generation jobs.
///
/// Every counter is an atomic; recording never blocks.
pub struct PipelineMetrics {
    start_time: Instant,
    jobs_submitted: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    failures_by_class: [AtomicU64; FailureClass::ALL.len()],
    repairs_applied: AtomicU64,
    refunds_attempted: AtomicU64,
    refunds_failed: AtomicU64,
    upstream_calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Count of failed jobs for one failure class
#[derive(Debug, Clone, Serialize)]
pub struct FailureCount {
    pub class: &'static str,
    pub count: u64,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub uptime_ms: u64,
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub failures: Vec<FailureCount>,
    pub repairs_applied: u64,
    pub refunds_attempted: u64,
    pub refunds_failed: u64,
    pub upstream_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub avg_latency_ms: f64,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            jobs_submitted: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            failures_by_class: std::array::from_fn(|_| AtomicU64::new(0)),
            repairs_applied: AtomicU64::new(0),
            refunds_attempted: AtomicU64::new(0),
            refunds_failed: AtomicU64::new(0),
            upstream_calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
        }
    }

    pub fn record_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, was_repaired: bool) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        if was_repaired {
            self.repairs_applied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self, class: FailureClass) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        self.failures_by_class[class.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refund attempt and whether it failed
    pub fn record_refund(&self, succeeded: bool) {
        self.refunds_attempted.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.refunds_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record usage from a non-streaming upstream response
    pub fn record_response(&self, response: &LlmResponse) {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(response.usage.input_tokens as u64, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(response.usage.output_tokens as u64, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(response.timing.total_ms, Ordering::Relaxed);
    }

    /// Record a streaming call, which reports latency but no token usage
    pub fn record_stream(&self, latency_ms: u64) {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn failures(&self, class: FailureClass) -> u64 {
        self.failures_by_class[class.index()].load(Ordering::Relaxed)
    }

    /// Get current metrics snapshot
    pub fn summary(&self) -> MetricsSummary {
        let upstream_calls = self.upstream_calls.load(Ordering::Relaxed);
        let input_tokens = self.input_tokens.load(Ordering::Relaxed);
        let output_tokens = self.output_tokens.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let avg_latency = if upstream_calls > 0 {
            total_latency as f64 / upstream_calls as f64
        } else {
            0.0
        };

        MetricsSummary {
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            failures: FailureClass::ALL
                .iter()
                .map(|class| FailureCount {
                    class: class.as_str(),
                    count: self.failures(*class),
                })
                .collect(),
            repairs_applied: self.repairs_applied.load(Ordering::Relaxed),
            refunds_attempted: self.refunds_attempted.load(Ordering::Relaxed),
            refunds_failed: self.refunds_failed.load(Ordering::Relaxed),
            upstream_calls,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            avg_latency_ms: avg_latency,
        }
    }
}

impl MetricsSummary {
    /// Format summary for display
    pub fn display(&self) -> String {
        let failures = self
            .failures
            .iter()
            .filter(|f| f.count > 0)
            .map(|f| format!("{}={}", f.class, f.count))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Uptime: {:.1}s\n\
             Jobs: {} submitted, {} completed, {} failed\n\
             Failures: {}\n\
             Repairs Applied: {}\n\
             Refunds: {} attempted, {} failed\n\
             Upstream Calls: {}\n\
             Tokens: {} (input: {}, output: {})\n\
             Avg Latency: {:.0}ms",
            self.uptime_ms as f64 / 1000.0,
            self.jobs_submitted,
            self.jobs_completed,
            self.jobs_failed,
            if failures.is_empty() { "none" } else { &failures },
            self.repairs_applied,
            self.refunds_attempted,
            self.refunds_failed,
            self.upstream_calls,
            self.total_tokens,
            self.input_tokens,
            self.output_tokens,
            self.avg_latency_ms,
        )
    }
}

// =============================================================================
// Shared Type
// =============================================================================

/// Shared metrics collector for the job manager and its tasks
pub type SharedMetrics = Arc<PipelineMetrics>;

/// Create shared metrics collector
pub fn create_shared_metrics() -> SharedMetrics {
    Arc::new(PipelineMetrics::new())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{ResponseMetadata, ResponseTiming, TokenUsage};

    #[test]
    fn test_record_response() {
        let metrics = PipelineMetrics::new();

        let response = LlmResponse {
            content: "{}".to_string(),
            usage: TokenUsage::from_openai(100, 50),
            timing: ResponseTiming { total_ms: 500 },
            metadata: ResponseMetadata {
                model: "gpt-4o-mini".to_string(),
                provider: "openai".to_string(),
            },
        };

        metrics.record_response(&response);

        let summary = metrics.summary();
        assert_eq!(summary.upstream_calls, 1);
        assert_eq!(summary.input_tokens, 100);
        assert_eq!(summary.output_tokens, 50);
        assert_eq!(summary.total_tokens, 150);
        assert!((summary.avg_latency_ms - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failures_counted_per_class() {
        let metrics = PipelineMetrics::new();
        metrics.record_failure(FailureClass::NoCapacity);
        metrics.record_failure(FailureClass::NoCapacity);
        metrics.record_failure(FailureClass::MalformedOutput);

        assert_eq!(metrics.failures(FailureClass::NoCapacity), 2);
        assert_eq!(metrics.failures(FailureClass::MalformedOutput), 1);
        assert_eq!(metrics.failures(FailureClass::Upstream), 0);
        assert_eq!(metrics.summary().jobs_failed, 3);
    }

    #[test]
    fn test_refund_counters() {
        let metrics = PipelineMetrics::new();
        metrics.record_refund(true);
        metrics.record_refund(false);

        let summary = metrics.summary();
        assert_eq!(summary.refunds_attempted, 2);
        assert_eq!(summary.refunds_failed, 1);
    }

    #[test]
    fn test_concurrent_recording() {
        use std::thread;

        let metrics = Arc::new(PipelineMetrics::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_submitted();
                        m.record_completed(true);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let summary = metrics.summary();
        assert_eq!(summary.jobs_submitted, 1000);
        assert_eq!(summary.jobs_completed, 1000);
        assert_eq!(summary.repairs_applied, 1000);
    }

    #[test]
    fn test_summary_display() {
        let metrics = PipelineMetrics::new();
        metrics.record_submitted();
        metrics.record_failure(FailureClass::NoStructuredOutput);

        let display = metrics.summary().display();
        assert!(display.contains("1 submitted"));
        assert!(display.contains("no_structured_output=1"));
    }
}
