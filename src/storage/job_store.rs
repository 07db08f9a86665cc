//! Job record persistence.
//!
//! [`JobStore`] is the seam between the job manager and storage:
//! - [`MemoryJobStore`] keeps records in a `DashMap`
//! - [`SqliteJobStore`] persists them through [`Database`]
//!
//! Both enforce the single terminal transition via [`GenerationJob::apply`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use super::database::{Database, SharedDatabase};
use crate::types::{
    GenerationJob, GenerationRequest, JobId, JobOutcome, JobStatus, PipelineError, Result,
    ResultExt,
};

/// Job record storage
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job; fails if the id already exists
    async fn create(&self, job: &GenerationJob) -> Result<()>;

    /// Read a job verbatim
    async fn get(&self, id: &JobId) -> Result<Option<GenerationJob>>;

    /// Apply the terminal outcome and return the updated record
    async fn finish(&self, id: &JobId, outcome: JobOutcome) -> Result<GenerationJob>;

    /// Most recent jobs of one owner, newest first
    async fn list_by_owner(&self, owner: &str, limit: usize) -> Result<Vec<GenerationJob>>;
}

/// Shared job store for the manager and its background tasks
pub type SharedJobStore = Arc<dyn JobStore>;

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: DashMap<JobId, GenerationJob>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &GenerationJob) -> Result<()> {
        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(PipelineError::Storage(format!(
                "Job {} already exists",
                job.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &JobId) -> Result<Option<GenerationJob>> {
        Ok(self.jobs.get(id).map(|entry| entry.value().clone()))
    }

    async fn finish(&self, id: &JobId, outcome: JobOutcome) -> Result<GenerationJob> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| PipelineError::JobNotFound(id.to_string()))?;
        entry.apply(outcome, Utc::now())?;
        Ok(entry.clone())
    }

    async fn list_by_owner(&self, owner: &str, limit: usize) -> Result<Vec<GenerationJob>> {
        let mut jobs: Vec<GenerationJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.owner == owner)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

// =============================================================================
// SQLite store
// =============================================================================

/// SQLite-backed store; blocking calls run on the blocking thread pool
#[derive(Clone)]
pub struct SqliteJobStore {
    db: SharedDatabase,
}

const SELECT_COLUMNS: &str = "id, owner, status, status_message, input_json, document_json, created_at, updated_at";

/// Raw column values of one job row
type JobRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
);

impl SqliteJobStore {
    /// Wrap an opened database, creating the schema if needed
    pub fn new(db: SharedDatabase) -> Result<Self> {
        db.initialize()?;
        Ok(Self { db })
    }

    async fn run_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| PipelineError::Internal(format!("Storage task failed: {}", e)))?
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn decode(row: JobRow) -> Result<GenerationJob> {
        let (id, owner, status, status_message, input_json, document_json, created, updated) =
            row;

        let status = status
            .parse::<JobStatus>()
            .map_err(PipelineError::Storage)?;
        let input: GenerationRequest = serde_json::from_str(&input_json)?;

        Ok(GenerationJob {
            id: id.parse()?,
            owner,
            status,
            status_message,
            input,
            document: serde_json::from_str(&document_json)?,
            created_at: parse_timestamp(&created)?,
            updated_at: parse_timestamp(&updated)?,
        })
    }

    fn load(conn: &rusqlite::Connection, id: &JobId) -> Result<Option<GenerationJob>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM generation_jobs WHERE id = ?1", SELECT_COLUMNS),
                params![id.to_string()],
                Self::map_row,
            )
            .optional()
            .with_context("Failed to load job")?;
        row.map(Self::decode).transpose()
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(format!("Invalid timestamp '{}'", value))
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: &GenerationJob) -> Result<()> {
        let job = job.clone();
        self.run_blocking(move |db| {
            let input_json = serde_json::to_string(&job.input)?;
            let document_json = serde_json::to_string(&job.document)?;

            db.connection()?
                .execute(
                    "INSERT INTO generation_jobs
                     (id, owner, status, status_message, input_json, document_json, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        job.id.to_string(),
                        job.owner,
                        job.status.as_str(),
                        job.status_message,
                        input_json,
                        document_json,
                        format_timestamp(&job.created_at),
                        format_timestamp(&job.updated_at),
                    ],
                )
                .with_context("Failed to insert job")?;

            debug!(job_id = %job.id, "Stored new job");
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &JobId) -> Result<Option<GenerationJob>> {
        let id = *id;
        self.run_blocking(move |db| {
            let conn = db.connection()?;
            Self::load(&conn, &id)
        })
        .await
    }

    async fn finish(&self, id: &JobId, outcome: JobOutcome) -> Result<GenerationJob> {
        let id = *id;
        self.run_blocking(move |db| {
            db.transaction(|conn| {
                let mut job =
                    Self::load(conn, &id)?.ok_or_else(|| PipelineError::JobNotFound(id.to_string()))?;
                job.apply(outcome, Utc::now())?;

                let document_json = serde_json::to_string(&job.document)?;
                conn.execute(
                    "UPDATE generation_jobs
                     SET status = ?1, status_message = ?2, document_json = ?3, updated_at = ?4
                     WHERE id = ?5 AND status = 'processing'",
                    params![
                        job.status.as_str(),
                        job.status_message,
                        document_json,
                        format_timestamp(&job.updated_at),
                        id.to_string(),
                    ],
                )
                .with_context("Failed to update job")?;

                debug!(job_id = %id, status = %job.status, "Stored terminal job state");
                Ok(job)
            })
        })
        .await
    }

    async fn list_by_owner(&self, owner: &str, limit: usize) -> Result<Vec<GenerationJob>> {
        let owner = owner.to_string();
        self.run_blocking(move |db| {
            let conn = db.connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM generation_jobs WHERE owner = ?1
                     ORDER BY created_at DESC LIMIT ?2",
                    SELECT_COLUMNS
                ))
                .with_context("Failed to prepare job listing")?;

            let rows = stmt
                .query_map(params![owner, limit as i64], Self::map_row)
                .with_context("Failed to list jobs")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .with_context("Failed to read job rows")?;

            rows.into_iter().map(Self::decode).collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentShape;
    use serde_json::json;
    use tempfile::TempDir;

    fn job(owner: &str) -> GenerationJob {
        let request = GenerationRequest::new("Plan a launch")
            .with_parameters(json!({"title": "T", "contentTypes": ["x"]}))
            .with_shape(DocumentShape::from_value(json!({"title": "", "sections": []})).unwrap());
        GenerationJob::new(owner, request)
    }

    fn sqlite_store() -> SqliteJobStore {
        SqliteJobStore::new(Arc::new(Database::open_in_memory().unwrap())).unwrap()
    }

    async fn exercise_lifecycle(store: &dyn JobStore) {
        let created = job("alice");
        store.create(&created).await.unwrap();

        let fetched = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Processing);
        assert_eq!(fetched.document, json!({"title": "", "sections": []}));
        assert_eq!(fetched.input, created.input);

        let finished = store
            .finish(
                &created.id,
                JobOutcome::Completed {
                    document: json!({"title": "Launch", "sections": ["a"]}),
                },
            )
            .await
            .unwrap();
        assert_eq!(finished.status, JobStatus::Completed);

        let stored = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.document["title"], "Launch");
        assert!(stored.updated_at >= stored.created_at);

        let second = store
            .finish(
                &created.id,
                JobOutcome::Failed {
                    message: "late".to_string(),
                },
            )
            .await;
        assert!(matches!(
            second,
            Err(PipelineError::InvalidTransition { .. })
        ));
        let unchanged = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, JobStatus::Completed);
    }

    async fn exercise_listing(store: &dyn JobStore) {
        let mut first = job("bob");
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        let second = job("bob");
        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();
        store.create(&job("carol")).await.unwrap();

        let listed = store.list_by_owner("bob", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);

        assert_eq!(store.list_by_owner("bob", 1).await.unwrap().len(), 1);
        assert!(store.list_by_owner("nobody", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        exercise_lifecycle(&MemoryJobStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_lifecycle() {
        exercise_lifecycle(&sqlite_store()).await;
    }

    #[tokio::test]
    async fn test_memory_store_listing() {
        exercise_listing(&MemoryJobStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_listing() {
        exercise_listing(&sqlite_store()).await;
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let created = job("alice");

        let memory = MemoryJobStore::new();
        memory.create(&created).await.unwrap();
        assert!(memory.create(&created).await.is_err());
        assert_eq!(memory.len(), 1);

        let sqlite = sqlite_store();
        sqlite.create(&created).await.unwrap();
        assert!(sqlite.create(&created).await.is_err());
    }

    #[tokio::test]
    async fn test_finish_unknown_job() {
        let id = JobId::new();
        let outcome = JobOutcome::Failed {
            message: "x".to_string(),
        };

        assert!(matches!(
            MemoryJobStore::new().finish(&id, outcome.clone()).await,
            Err(PipelineError::JobNotFound(_))
        ));
        assert!(matches!(
            sqlite_store().finish(&id, outcome).await,
            Err(PipelineError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_failed_outcome_keeps_placeholder() {
        let store = sqlite_store();
        let created = job("alice");
        store.create(&created).await.unwrap();

        store
            .finish(
                &created.id,
                JobOutcome::Failed {
                    message: "Model produced no structured output".to_string(),
                },
            )
            .await
            .unwrap();

        let stored = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(
            stored.status_message.as_deref(),
            Some("Model produced no structured output")
        );
        assert_eq!(stored.document, created.document);
    }

    #[tokio::test]
    async fn test_sqlite_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.db");
        let created = job("alice");

        {
            let store = SqliteJobStore::new(Arc::new(Database::open(&path).unwrap())).unwrap();
            store.create(&created).await.unwrap();
        }

        let reopened = SqliteJobStore::new(Arc::new(Database::open(&path).unwrap())).unwrap();
        let stored = reopened.get(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.id, created.id);
        assert_eq!(stored.owner, "alice");
    }
}
