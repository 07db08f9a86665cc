pub mod database;
pub mod job_store;

pub use database::{Database, PoolConfig, SharedDatabase};
pub use job_store::{JobStore, MemoryJobStore, SharedJobStore, SqliteJobStore};

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::types::Result;

/// Open the job store selected by configuration
pub fn open_job_store(config: &StorageConfig) -> Result<SharedJobStore> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryJobStore::new())),
        StorageBackend::Sqlite => {
            let db = Database::open(&config.database)?;
            Ok(Arc::new(SqliteJobStore::new(Arc::new(db))?))
        }
    }
}
