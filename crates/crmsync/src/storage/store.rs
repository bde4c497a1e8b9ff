//! Data-access contracts consumed by the sync engine
//!
//! Both sync directions only ever talk to the local database through these
//! traits. Implementations: `SqliteStore` (durable) and `MemoryStore` (tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crmsync_api::{
    Contact, ContactFilter, ContactPatch, Credentials, JobId, NewContact, SyncJob, Upserted,
};

use super::types::Result;

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn find_contacts(&self, filter: ContactFilter) -> Result<Vec<Contact>>;

    /// Update the row with this email using `update`, or create it from `create`
    async fn upsert_contact_by_email(
        &self,
        email: &str,
        create: NewContact,
        update: ContactPatch,
    ) -> Result<Upserted>;

    /// Insert a row. Fails with `StoreError::ConstraintViolation` if the email is taken.
    async fn create_contact(&self, fields: NewContact) -> Result<Contact>;

    /// Attach or overwrite the remote identifier of the row with this email
    async fn update_contact_remote_id(&self, email: &str, remote_id: &str) -> Result<Contact>;

    async fn create_sync_job(&self, execution_time: DateTime<Utc>) -> Result<JobId>;

    /// Store the final aggregates of a job that is still open. Fails with
    /// `NotFound` for an unknown id and `ConstraintViolation` for a completed one.
    async fn complete_sync_job(
        &self,
        job_id: JobId,
        success: String,
        failures: String,
        completed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_sync_job(&self, job_id: JobId) -> Result<Option<SyncJob>>;

    /// Most recent first
    async fn list_sync_jobs(&self, limit: usize) -> Result<Vec<SyncJob>>;
}

/// Credential rows keyed by customer identifier
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_credentials(&self, customer_id: &str) -> Result<Option<Credentials>>;

    async fn save_credentials(&self, credentials: &Credentials) -> Result<()>;
}
