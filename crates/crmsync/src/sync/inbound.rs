use std::sync::Arc;
use tracing::{debug, error, info, warn, Span};

use super::error::{Result, SyncError};
use super::identity::{new_contact_from_remote, sync_record};
use crate::auth::CredentialProvider;
use crate::config::SyncConfig;
use crate::remote::RemoteDirectory;
use crate::storage::{LocalStore, StoreError};
use crmsync_api::{
    ContactFilter, ContactPatch, ContactSyncRecord, InboundOutcome, InboundReport, JobRunResult,
    ListRequest, RemoteContactRecord, Upserted,
};

/// Pulls the whole remote contact collection and merges it into the local store
///
/// Records with an email are upserted by email: an existing row only gets its
/// remote id attached, a missing row is created in full. Records without an
/// email cannot be matched and are created, unless a row already carries
/// their remote id.
pub struct InboundSync {
    store: Arc<dyn LocalStore>,
    directory: Arc<dyn RemoteDirectory>,
    credentials: Arc<dyn CredentialProvider>,
    customer_id: String,
    page_size: usize,
    properties: Vec<String>,
    include_archived: bool,
    verbose_create_or_update: bool,
}

impl InboundSync {
    pub fn new(
        store: Arc<dyn LocalStore>,
        directory: Arc<dyn RemoteDirectory>,
        credentials: Arc<dyn CredentialProvider>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            directory,
            credentials,
            customer_id: config.customer_id.clone(),
            page_size: config.page_size,
            properties: config.inbound_properties.clone(),
            include_archived: config.include_archived,
            verbose_create_or_update: config.verbose_create_or_update,
        }
    }

    #[tracing::instrument(
        name = "sync.inbound",
        skip(self),
        fields(
            sync.directory = self.directory.directory_name(),
            sync.total = tracing::field::Empty,
            sync.upsert = tracing::field::Empty,
            sync.created = tracing::field::Empty,
            sync.errors = tracing::field::Empty,
        )
    )]
    pub async fn run_inbound_sync(&self) -> Result<InboundReport> {
        let token = self.credentials.access_token(&self.customer_id).await?;

        let request = ListRequest {
            page_size: self.page_size,
            after: None,
            properties: self.properties.clone(),
            archived: self.include_archived,
        };
        let records = self
            .directory
            .list_all(&token, request)
            .await
            .map_err(|e| {
                error!("[InboundSync] Failed to list remote contacts: {}", e);
                SyncError::RemoteList(e)
            })?;
        info!(
            "[InboundSync] Fetched {} remote contacts from {}",
            records.len(),
            self.directory.directory_name()
        );

        let mut results = JobRunResult::default();
        for record in &records {
            let outcome = if self.verbose_create_or_update {
                self.create_or_update(record).await
            } else {
                self.upsert(record).await
            };
            results.record(outcome);
        }

        let span = Span::current();
        span.record("sync.total", records.len());
        span.record("sync.upsert", results.count(InboundOutcome::Upsert));
        span.record("sync.created", results.count(InboundOutcome::Created));
        span.record(
            "sync.errors",
            results.count(InboundOutcome::Error) + results.count(InboundOutcome::Failed),
        );
        info!(
            "[InboundSync] Done: {} upsert, {} created, {} hsID_updated, {} failed, {} errors",
            results.count(InboundOutcome::Upsert),
            results.count(InboundOutcome::Created),
            results.count(InboundOutcome::RemoteIdUpdated),
            results.count(InboundOutcome::Failed),
            results.count(InboundOutcome::Error),
        );

        Ok(InboundReport {
            total: records.len(),
            results,
        })
    }

    async fn upsert(&self, record: &RemoteContactRecord) -> ContactSyncRecord {
        let Some(email) = record.email() else {
            return self.create_without_email(record, InboundOutcome::Error).await;
        };

        let outcome = self
            .store
            .upsert_contact_by_email(
                email,
                new_contact_from_remote(record),
                ContactPatch::link(record.id.clone()),
            )
            .await;

        match outcome {
            Ok(Upserted::Updated(contact)) => {
                sync_record(record, Some(&contact), InboundOutcome::Upsert, None)
            }
            Ok(Upserted::Created(contact)) => {
                sync_record(record, Some(&contact), InboundOutcome::Created, None)
            }
            Err(e) => {
                error!("[InboundSync] Failed to upsert remote contact {}: {}", record.id, e);
                sync_record(record, None, InboundOutcome::Error, Some(e.to_string()))
            }
        }
    }

    /// Optional path: create, and on a unique-email clash attach the remote id instead
    async fn create_or_update(&self, record: &RemoteContactRecord) -> ContactSyncRecord {
        let Some(email) = record.email() else {
            return self.create_without_email(record, InboundOutcome::Failed).await;
        };

        match self.store.create_contact(new_contact_from_remote(record)).await {
            Ok(contact) => sync_record(record, Some(&contact), InboundOutcome::Created, None),
            Err(StoreError::ConstraintViolation { .. }) => {
                debug!(
                    "[InboundSync] {} already exists locally, updating remote id to {}",
                    email, record.id
                );
                match self.store.update_contact_remote_id(email, &record.id).await {
                    Ok(contact) => {
                        sync_record(record, Some(&contact), InboundOutcome::RemoteIdUpdated, None)
                    }
                    Err(e) => {
                        error!("[InboundSync] Failed to update remote id for {}: {}", email, e);
                        sync_record(record, None, InboundOutcome::Failed, Some(e.to_string()))
                    }
                }
            }
            Err(e) => {
                error!("[InboundSync] Failed to create remote contact {}: {}", record.id, e);
                sync_record(record, None, InboundOutcome::Failed, Some(e.to_string()))
            }
        }
    }

    /// No natural key: create a row unless one is already linked to this remote id
    async fn create_without_email(
        &self,
        record: &RemoteContactRecord,
        on_error: InboundOutcome,
    ) -> ContactSyncRecord {
        let linked = self
            .store
            .find_contacts(ContactFilter::RemoteId(record.id.clone()))
            .await;
        match linked {
            Ok(existing) if !existing.is_empty() => {
                debug!(
                    "[InboundSync] Remote contact {} has no email and is already linked",
                    record.id
                );
                return sync_record(record, existing.first(), InboundOutcome::Upsert, None);
            }
            Ok(_) => {}
            Err(e) => {
                error!("[InboundSync] Failed to look up remote id {}: {}", record.id, e);
                return sync_record(record, None, on_error, Some(e.to_string()));
            }
        }

        warn!(
            "[InboundSync] Remote contact {} has no email, creating an unmatched local row",
            record.id
        );
        match self.store.create_contact(new_contact_from_remote(record)).await {
            Ok(contact) => sync_record(record, Some(&contact), InboundOutcome::Created, None),
            Err(e) => {
                error!("[InboundSync] Failed to create remote contact {}: {}", record.id, e);
                sync_record(record, None, on_error, Some(e.to_string()))
            }
        }
    }
}
