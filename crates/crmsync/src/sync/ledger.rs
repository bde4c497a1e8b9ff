use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{Result, SyncError};
use crate::storage::{LocalStore, StoreError};
use crmsync_api::{JobId, SyncJob};

/// Durable record of outbound runs: one `open` and one `complete` per run
pub struct SyncJobLedger {
    store: Arc<dyn LocalStore>,
}

impl SyncJobLedger {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub async fn open(&self, execution_time: DateTime<Utc>) -> Result<JobId> {
        let job_id = self.store.create_sync_job(execution_time).await?;
        debug!("[SyncJobLedger] Opened job {} at {}", job_id, execution_time);
        Ok(job_id)
    }

    /// Finalize a job with its serialized aggregates. A completed job is never revised.
    pub async fn complete<S, F>(&self, job_id: JobId, success: &S, failures: &F) -> Result<()>
    where
        S: Serialize + ?Sized + Sync,
        F: Serialize + ?Sized + Sync,
    {
        let success = serde_json::to_string(success)
            .map_err(|e| SyncError::Ledger(format!("failed to serialize success aggregate: {e}")))?;
        let failures = serde_json::to_string(failures)
            .map_err(|e| SyncError::Ledger(format!("failed to serialize failure aggregate: {e}")))?;

        self.store
            .complete_sync_job(job_id, success, failures, Utc::now())
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => {
                    SyncError::Ledger(format!("job {job_id} does not exist"))
                }
                e if e.is_constraint_violation() => {
                    SyncError::Ledger(format!("job {job_id} is already completed"))
                }
                e => SyncError::Store(e),
            })?;
        info!("[SyncJobLedger] Completed job {}", job_id);
        Ok(())
    }

    pub async fn job(&self, job_id: JobId) -> Result<Option<SyncJob>> {
        Ok(self.store.get_sync_job(job_id).await?)
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<SyncJob>> {
        Ok(self.store.list_sync_jobs(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SqliteStore};

    #[tokio::test]
    async fn test_job_is_write_once() {
        let ledger = SyncJobLedger::new(Arc::new(MemoryStore::new()));
        let job_id = ledger.open(Utc::now()).await.unwrap();

        let open = ledger.job(job_id).await.unwrap().unwrap();
        assert!(!open.is_completed());

        ledger.complete(job_id, &vec![1, 2], &Vec::<u8>::new()).await.unwrap();
        let done = ledger.job(job_id).await.unwrap().unwrap();
        assert_eq!(done.success.as_deref(), Some("[1,2]"));
        assert_eq!(done.failures.as_deref(), Some("[]"));

        let err = ledger.complete(job_id, &vec![3], &vec![4]).await.unwrap_err();
        assert!(matches!(err, SyncError::Ledger(_)));
        let unchanged = ledger.job(job_id).await.unwrap().unwrap();
        assert_eq!(unchanged.success.as_deref(), Some("[1,2]"));
    }

    #[tokio::test]
    async fn test_completing_unknown_job_fails() {
        let ledger = SyncJobLedger::new(Arc::new(MemoryStore::new()));
        let err = ledger.complete(99, &(), &()).await.unwrap_err();
        assert!(matches!(err, SyncError::Ledger(_)));
    }

    #[tokio::test]
    async fn test_recent_lists_newest_first() {
        let ledger = SyncJobLedger::new(Arc::new(MemoryStore::new()));
        let first = ledger.open(Utc::now()).await.unwrap();
        let second = ledger.open(Utc::now()).await.unwrap();

        let jobs = ledger.recent(10).await.unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn test_sqlite_job_is_write_once() {
        let ledger = SyncJobLedger::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let job_id = ledger.open(Utc::now()).await.unwrap();
        ledger.complete(job_id, &["first"], &()).await.unwrap();

        let err = ledger.complete(job_id, &["second"], &()).await.unwrap_err();
        assert!(matches!(err, SyncError::Ledger(ref msg) if msg.contains("already completed")));
        let job = ledger.job(job_id).await.unwrap().unwrap();
        assert_eq!(job.success.as_deref(), Some("[\"first\"]"));

        let err = ledger.complete(job_id + 1, &(), &()).await.unwrap_err();
        assert!(matches!(err, SyncError::Ledger(ref msg) if msg.contains("does not exist")));
    }
}
