//! In-memory implementation of the store contracts
//!
//! HashMap-backed, non-persistent. Enforces the same unique-email invariant as
//! the SQLite schema so that both stores behave identically under the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crmsync_api::{
    Contact, ContactFilter, ContactId, ContactPatch, Credentials, JobId, NewContact, SyncJob,
    Upserted,
};

use super::store::{CredentialStore, LocalStore};
use super::types::{Result, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    contacts: BTreeMap<ContactId, Contact>,
    next_contact_id: ContactId,
    jobs: BTreeMap<JobId, SyncJob>,
    next_job_id: JobId,
    credentials: HashMap<String, Credentials>,
}

impl MemoryState {
    fn by_email(&self, email: &str) -> Option<&Contact> {
        self.contacts
            .values()
            .find(|c| c.email.as_deref() == Some(email))
    }

    fn insert(&mut self, fields: NewContact) -> Result<Contact> {
        if let Some(email) = fields.email.as_deref() {
            if self.by_email(email).is_some() {
                return Err(StoreError::ConstraintViolation {
                    field: "email".to_string(),
                    value: email.to_string(),
                });
            }
        }
        self.next_contact_id += 1;
        let contact = Contact {
            id: self.next_contact_id,
            first_name: fields.first_name,
            last_name: fields.last_name,
            email: fields.email,
            remote_id: fields.remote_id,
        };
        self.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed rows directly, bypassing the engine
    pub async fn seed(&self, contacts: impl IntoIterator<Item = NewContact>) -> Result<Vec<Contact>> {
        let mut state = self.state.write().await;
        contacts.into_iter().map(|c| state.insert(c)).collect()
    }

    pub async fn contact_count(&self) -> usize {
        self.state.read().await.contacts.len()
    }

    pub async fn contact_by_email(&self, email: &str) -> Option<Contact> {
        self.state.read().await.by_email(email).cloned()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn find_contacts(&self, filter: ContactFilter) -> Result<Vec<Contact>> {
        let state = self.state.read().await;
        Ok(state
            .contacts
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn upsert_contact_by_email(
        &self,
        email: &str,
        create: NewContact,
        update: ContactPatch,
    ) -> Result<Upserted> {
        let mut state = self.state.write().await;
        if let Some(id) = state.by_email(email).map(|c| c.id) {
            let existing = state
                .contacts
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("contacts", email))?;
            if let Some(first_name) = update.first_name {
                existing.first_name = Some(first_name);
            }
            if let Some(last_name) = update.last_name {
                existing.last_name = Some(last_name);
            }
            if let Some(remote_id) = update.remote_id {
                existing.remote_id = Some(remote_id);
            }
            return Ok(Upserted::Updated(existing.clone()));
        }

        let fields = NewContact {
            email: Some(email.to_string()),
            ..create
        };
        Ok(Upserted::Created(state.insert(fields)?))
    }

    async fn create_contact(&self, fields: NewContact) -> Result<Contact> {
        self.state.write().await.insert(fields)
    }

    async fn update_contact_remote_id(&self, email: &str, remote_id: &str) -> Result<Contact> {
        let mut state = self.state.write().await;
        let contact = state
            .contacts
            .values_mut()
            .find(|c| c.email.as_deref() == Some(email))
            .ok_or_else(|| StoreError::not_found("contacts", email))?;
        contact.remote_id = Some(remote_id.to_string());
        Ok(contact.clone())
    }

    async fn create_sync_job(&self, execution_time: DateTime<Utc>) -> Result<JobId> {
        let mut state = self.state.write().await;
        state.next_job_id += 1;
        let id = state.next_job_id;
        state.jobs.insert(
            id,
            SyncJob {
                id,
                execution_time,
                success: None,
                failures: None,
                completed_at: None,
            },
        );
        Ok(id)
    }

    async fn complete_sync_job(
        &self,
        job_id: JobId,
        success: String,
        failures: String,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::not_found("sync_jobs", job_id.to_string()))?;
        if job.completed_at.is_some() {
            return Err(StoreError::already_completed(job_id));
        }
        job.success = Some(success);
        job.failures = Some(failures);
        job.completed_at = Some(completed_at);
        Ok(())
    }

    async fn get_sync_job(&self, job_id: JobId) -> Result<Option<SyncJob>> {
        Ok(self.state.read().await.jobs.get(&job_id).cloned())
    }

    async fn list_sync_jobs(&self, limit: usize) -> Result<Vec<SyncJob>> {
        let state = self.state.read().await;
        Ok(state.jobs.values().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load_credentials(&self, customer_id: &str) -> Result<Option<Credentials>> {
        Ok(self.state.read().await.credentials.get(customer_id).cloned())
    }

    async fn save_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.state
            .write()
            .await
            .credentials
            .insert(credentials.customer_id.clone(), credentials.clone());
        Ok(())
    }
}
