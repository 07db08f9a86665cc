//! Job Lifecycle Manager
//!
//! Creates job records, runs each job on a detached tokio task, and records
//! the single terminal transition. Every failure ends in `failed` followed by
//! exactly one credit refund attempt.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::ai::provider::{build_generation_prompt, collect_stream};
use crate::ai::{ClientPool, ProcessedResponse, SharedMetrics, ValidationPipeline};
use crate::billing::{RefundRequest, SharedLedger, create_ledger};
use crate::config::Config;
use crate::storage::{SharedJobStore, open_job_store};
use crate::types::{
    GenerationJob, GenerationRequest, JobHandle, JobId, JobOutcome, PipelineError, Result,
};

/// Count of job tasks that have not returned yet
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Held by a job task for its whole run, refund included
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Owns the collaborators shared by every job task
#[derive(Clone)]
pub struct JobManager {
    store: SharedJobStore,
    pool: Arc<ClientPool>,
    ledger: SharedLedger,
    metrics: SharedMetrics,
    default_model: String,
    in_flight: Arc<InFlight>,
}

impl JobManager {
    pub fn new(
        store: SharedJobStore,
        pool: Arc<ClientPool>,
        ledger: SharedLedger,
        metrics: SharedMetrics,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            pool,
            ledger,
            metrics,
            default_model: default_model.into(),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Wire store, pool and ledger from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            open_job_store(&config.storage)?,
            Arc::new(ClientPool::from_config(config)?),
            create_ledger(&config.billing)?,
            crate::ai::create_shared_metrics(),
            config.llm.model.clone(),
        ))
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Create a job and start its background task.
    ///
    /// Returns as soon as the `processing` record is persisted. Validation and
    /// persistence errors are returned here since no job exists yet.
    pub async fn submit(&self, owner: &str, request: GenerationRequest) -> Result<JobHandle> {
        if owner.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "owner must not be empty".to_string(),
            ));
        }
        request.validate()?;

        let job = GenerationJob::new(owner, request);
        self.store.create(&job).await?;
        self.metrics.record_submitted();
        info!(job_id = %job.id, owner = %job.owner, "Job created");

        let handle = job.handle();
        let span = info_span!("generation_job", job_id = %job.id, owner = %job.owner);
        let manager = self.clone();
        let guard = InFlightGuard::enter(&self.in_flight);
        tokio::spawn(
            async move {
                manager.run_job(job).await;
                drop(guard);
            }
            .instrument(span),
        );

        Ok(handle)
    }

    pub async fn get(&self, id: &JobId) -> Result<Option<GenerationJob>> {
        self.store.get(id).await
    }

    pub async fn list(&self, owner: &str, limit: usize) -> Result<Vec<GenerationJob>> {
        self.store.list_by_owner(owner, limit).await
    }

    /// Poll until the job leaves `processing`. Never cancels the job.
    pub async fn wait_for_terminal(
        &self,
        id: &JobId,
        poll_interval: Duration,
    ) -> Result<GenerationJob> {
        loop {
            match self.store.get(id).await? {
                None => return Err(PipelineError::JobNotFound(id.to_string())),
                Some(job) if job.status.is_terminal() => return Ok(job),
                Some(_) => tokio::time::sleep(poll_interval).await,
            }
        }
    }

    /// Wait until every job task started by this manager has returned.
    ///
    /// A task returns after its terminal write and, on failure, its refund.
    pub async fn drain(&self) {
        loop {
            let idle = self.in_flight.idle.notified();
            if self.in_flight.count.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }

    async fn run_job(self, job: GenerationJob) {
        let result = AssertUnwindSafe(self.generate(&job))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let panic_msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());
                Err(PipelineError::Internal(format!(
                    "Generation task panicked: {}",
                    panic_msg
                )))
            });

        let processed = match result {
            Ok(processed) => processed,
            Err(e) => return self.fail(&job, e).await,
        };

        let outcome = JobOutcome::Completed {
            document: processed.document,
        };
        match self.store.finish(&job.id, outcome).await {
            Ok(_) => {
                self.metrics.record_completed(processed.was_repaired);
                info!(repaired = processed.was_repaired, "Job completed");
            }
            Err(e) => {
                error!(error = %e, "Failed to persist completed job");
                self.fail(&job, e).await;
            }
        }
    }

    /// Lease a client, call upstream, and turn the reply into a document.
    ///
    /// The lease is released as soon as the upstream call returns.
    async fn generate(&self, job: &GenerationJob) -> Result<ProcessedResponse> {
        let lease = self.pool.acquire()?;
        let model = job
            .input
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let prompt = build_generation_prompt(&job.input);

        debug!(client = lease.identity(), model = %model, stream = job.input.stream, "Calling upstream");

        let raw = if job.input.stream {
            let start = Instant::now();
            let chunks = lease.provider().generate_stream(&model, &prompt).await?;
            let text = collect_stream(chunks).await?;
            self.metrics
                .record_stream(start.elapsed().as_millis() as u64);
            text
        } else {
            let response = lease.provider().generate(&model, &prompt).await?;
            self.metrics.record_response(&response);
            response.content
        };
        lease.release();

        debug!(response_len = raw.len(), "Upstream call finished");

        let processed = ValidationPipeline::new(job.input.shape.clone()).process(&raw)?;
        if processed.was_repaired {
            warn!("Model output needed structural repair");
        }
        Ok(processed)
    }

    async fn fail(&self, job: &GenerationJob, err: PipelineError) {
        let class = err.failure_class();
        warn!(failure = %class, retryable = err.is_retryable(), error = %err, "Job failed");
        self.metrics.record_failure(class);

        let outcome = JobOutcome::Failed {
            message: err.status_message(),
        };
        if let Err(e) = self.store.finish(&job.id, outcome).await {
            error!(error = %e, "Failed to persist failed job; record stays processing");
        }

        self.refund(job).await;
    }

    /// Best-effort compensation: errors are counted and logged, never raised
    async fn refund(&self, job: &GenerationJob) {
        let request = RefundRequest::for_job(job.id, &job.owner);
        let result = self.ledger.refund(&request).await;
        self.metrics.record_refund(result.is_ok());

        if let Err(e) = result {
            warn!(error = %e, "Credit refund failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::mock::{MockProvider, MockReply};
    use crate::ai::{PooledClient, create_shared_metrics};
    use crate::billing::testing::RecordingLedger;
    use crate::storage::{JobStore, MemoryJobStore};
    use crate::types::{DocumentShape, ErrorCategory, FailureClass, JobStatus};
    use async_trait::async_trait;
    use serde_json::json;

    const POLL: Duration = Duration::from_millis(5);

    struct Harness {
        manager: JobManager,
        store: Arc<MemoryJobStore>,
        ledger: Arc<RecordingLedger>,
    }

    fn harness_with(clients: Vec<PooledClient>, ledger: RecordingLedger) -> Harness {
        let store = Arc::new(MemoryJobStore::new());
        let ledger = Arc::new(ledger);
        let manager = JobManager::new(
            store.clone(),
            Arc::new(ClientPool::new(clients)),
            ledger.clone(),
            create_shared_metrics(),
            "test-model",
        );
        Harness {
            manager,
            store,
            ledger,
        }
    }

    fn harness(provider: MockProvider) -> Harness {
        harness_with(
            vec![PooledClient::new("client-a", 1, Arc::new(provider))],
            RecordingLedger::default(),
        )
    }

    fn campaign_request() -> GenerationRequest {
        GenerationRequest::new("Write a campaign brief")
            .with_parameters(json!({"title": "T", "contentTypes": ["x"]}))
    }

    async fn run_to_end(h: &Harness, request: GenerationRequest) -> GenerationJob {
        let handle = h.manager.submit("alice", request).await.unwrap();
        assert_eq!(handle.status, JobStatus::Processing);

        tokio::time::timeout(
            Duration::from_secs(5),
            h.manager.wait_for_terminal(&handle.id, POLL),
        )
        .await
        .expect("job did not finish")
        .unwrap()
    }

    async fn eventually(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_fenced_trailing_comma_completes() {
        let h = harness(MockProvider::text(
            "Here's your JSON:\n```json\n{\"a\":1,}\n```\nHope that helps!",
        ));

        let job = run_to_end(&h, campaign_request()).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.document, json!({"a": 1}));
        assert!(job.status_message.is_none());
        assert_eq!(h.ledger.count(), 0);

        let summary = h.manager.metrics().summary();
        assert_eq!(summary.jobs_completed, 1);
        assert_eq!(summary.repairs_applied, 1);
    }

    #[tokio::test]
    async fn test_drain_waits_for_refund() {
        let h = harness(MockProvider::text("no braces here"));

        let handle = h.manager.submit("alice", campaign_request()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), h.manager.drain())
            .await
            .expect("tasks did not drain");

        let job = h.store.get(&handle.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(h.ledger.count(), 1);
    }

    #[tokio::test]
    async fn test_drain_without_jobs_returns() {
        let h = harness(MockProvider::text("{}"));
        h.manager.drain().await;
    }

    #[tokio::test]
    async fn test_truncated_payload_completes() {
        let h = harness(MockProvider::text("{\"a\":1"));

        let job = run_to_end(&h, campaign_request()).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.document, json!({"a": 1}));
        assert_eq!(h.ledger.count(), 0);
    }

    #[tokio::test]
    async fn test_plain_prose_fails_with_single_refund() {
        let h = harness(MockProvider::text("I'm sorry, I can't produce that."));

        let job = run_to_end(&h, campaign_request()).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.status_message.as_deref(),
            Some("Model produced no structured output")
        );

        eventually(|| h.ledger.count() == 1).await;
        let requests = h.ledger.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![RefundRequest::for_job(job.id, "alice")]);
        assert_eq!(
            h.manager.metrics().failures(FailureClass::NoStructuredOutput),
            1
        );
    }

    #[tokio::test]
    async fn test_new_job_starts_processing_with_placeholder() {
        let gate = Arc::new(Notify::new());
        let h = harness(MockProvider::text("{\"title\": \"Done\"}").gated(gate.clone()));
        let shape = DocumentShape::from_value(json!({"title": "", "sections": []})).unwrap();

        let handle = h
            .manager
            .submit("alice", campaign_request().with_shape(shape))
            .await
            .unwrap();

        let pending = h.manager.get(&handle.id).await.unwrap().unwrap();
        assert_eq!(pending.status, JobStatus::Processing);
        assert_eq!(pending.document, json!({"title": "", "sections": []}));
        assert_eq!(pending.input.parameters["title"], "T");

        gate.notify_one();
        let done = h.manager.wait_for_terminal(&handle.id, POLL).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.document, json!({"title": "Done", "sections": []}));
    }

    #[tokio::test]
    async fn test_full_pool_fails_third_job() {
        let gate_a = Arc::new(Notify::new());
        let gate_b = Arc::new(Notify::new());
        let h = harness_with(
            vec![
                PooledClient::new(
                    "client-a",
                    1,
                    Arc::new(MockProvider::text("{}").gated(gate_a.clone())),
                ),
                PooledClient::new(
                    "client-b",
                    1,
                    Arc::new(MockProvider::text("{}").gated(gate_b.clone())),
                ),
            ],
            RecordingLedger::default(),
        );

        let first = h.manager.submit("alice", campaign_request()).await.unwrap();
        let second = h.manager.submit("alice", campaign_request()).await.unwrap();
        let pool = h.manager.pool().clone();
        eventually(|| pool.snapshot().iter().all(|c| c.usage == c.capacity)).await;

        let third = run_to_end(&h, campaign_request()).await;
        assert_eq!(third.status, JobStatus::Failed);
        assert_eq!(
            third.status_message.as_deref(),
            Some("Service is at capacity, please retry shortly")
        );
        eventually(|| h.ledger.count() == 1).await;

        gate_a.notify_one();
        gate_b.notify_one();
        for id in [first.id, second.id] {
            let job = h.manager.wait_for_terminal(&id, POLL).await.unwrap();
            assert_eq!(job.status, JobStatus::Completed);
        }
        assert_eq!(h.ledger.count(), 1);
        assert!(pool.snapshot().iter().all(|c| c.usage == 0));
    }

    #[tokio::test]
    async fn test_upstream_failure_refunds_once() {
        let h = harness(MockProvider::new(MockReply::Fail(ErrorCategory::RateLimit)));

        let job = run_to_end(&h, campaign_request()).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.status_message.as_deref(), Some("Generation failed"));
        eventually(|| h.ledger.count() == 1).await;
        assert!(h.manager.pool().snapshot().iter().all(|c| c.usage == 0));
    }

    #[tokio::test]
    async fn test_malformed_output_reports_snippet() {
        let h = harness(MockProvider::text("{\"a\" 1}"));

        let job = run_to_end(&h, campaign_request()).await;
        assert_eq!(job.status, JobStatus::Failed);
        let message = job.status_message.unwrap();
        assert!(message.starts_with("Malformed model output: "));
        assert!(message.contains("{\"a\" 1}"));
        eventually(|| h.ledger.count() == 1).await;
    }

    #[tokio::test]
    async fn test_shape_mismatch_fails() {
        let h = harness(MockProvider::text("{\"sections\": \"none\"}"));
        let shape = DocumentShape::from_value(json!({"sections": []})).unwrap();

        let job = run_to_end(&h, campaign_request().with_shape(shape)).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(
            job.status_message
                .unwrap()
                .starts_with("Model output did not match the document shape")
        );
        assert_eq!(job.document, json!({"sections": []}));
        eventually(|| h.ledger.count() == 1).await;
    }

    #[tokio::test]
    async fn test_panicking_provider_is_contained() {
        let h = harness(MockProvider::new(MockReply::Panic));

        let job = run_to_end(&h, campaign_request()).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.status_message.as_deref(),
            Some("Internal error during generation")
        );
        eventually(|| h.ledger.count() == 1).await;
        assert!(h.manager.pool().snapshot().iter().all(|c| c.usage == 0));
    }

    #[tokio::test]
    async fn test_refund_failure_does_not_change_job() {
        let h = harness_with(
            vec![PooledClient::new(
                "client-a",
                1,
                Arc::new(MockProvider::text("no json here")),
            )],
            RecordingLedger::failing(),
        );

        let job = run_to_end(&h, campaign_request()).await;
        eventually(|| h.manager.metrics().summary().refunds_failed == 1).await;

        let stored = h.manager.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(h.ledger.count(), 1);
    }

    #[tokio::test]
    async fn test_streaming_chunks_are_concatenated() {
        let provider = MockProvider::new(MockReply::Chunks(vec![
            "<think>planning</think>".to_string(),
            "{\"a\":".to_string(),
            " 1}".to_string(),
        ]));
        let h = harness(provider);

        let job = run_to_end(&h, campaign_request().streaming(true)).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.document, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_invalid_request_surfaces_synchronously() {
        let provider = Arc::new(MockProvider::text("{}"));
        let h = harness_with(
            vec![PooledClient::new("client-a", 1, provider.clone())],
            RecordingLedger::default(),
        );

        let err = h
            .manager
            .submit("alice", GenerationRequest::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));

        let err = h
            .manager
            .submit("", campaign_request())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));

        assert!(h.store.is_empty());
        assert_eq!(provider.call_count(), 0);
        assert_eq!(h.ledger.count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_unknown_job() {
        let h = harness(MockProvider::text("{}"));
        let err = h
            .manager
            .wait_for_terminal(&JobId::new(), POLL)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::JobNotFound(_)));
    }

    /// Store whose terminal writes always fail
    struct ReadOnlyStore(MemoryJobStore);

    #[async_trait]
    impl JobStore for ReadOnlyStore {
        async fn create(&self, job: &GenerationJob) -> Result<()> {
            self.0.create(job).await
        }

        async fn get(&self, id: &JobId) -> Result<Option<GenerationJob>> {
            self.0.get(id).await
        }

        async fn finish(&self, _id: &JobId, _outcome: JobOutcome) -> Result<GenerationJob> {
            Err(PipelineError::Storage("disk full".to_string()))
        }

        async fn list_by_owner(&self, owner: &str, limit: usize) -> Result<Vec<GenerationJob>> {
            self.0.list_by_owner(owner, limit).await
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_still_refunds_once() {
        let ledger = Arc::new(RecordingLedger::default());
        let manager = JobManager::new(
            Arc::new(ReadOnlyStore(MemoryJobStore::new())),
            Arc::new(ClientPool::new(vec![PooledClient::new(
                "client-a",
                1,
                Arc::new(MockProvider::text("{\"a\": 1}")),
            )])),
            ledger.clone(),
            create_shared_metrics(),
            "test-model",
        );

        let handle = manager.submit("alice", campaign_request()).await.unwrap();
        eventually(|| ledger.count() == 1).await;

        let stuck = manager.get(&handle.id).await.unwrap().unwrap();
        assert_eq!(stuck.status, JobStatus::Processing);
        assert_eq!(manager.metrics().failures(FailureClass::Internal), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ledger.count(), 1);
    }
}
