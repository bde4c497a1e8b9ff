use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, Span};

use super::cohort::{CohortReport, SyncCohort};
use super::error::{Result, SyncError};
use super::ledger::SyncJobLedger;
use crate::auth::CredentialProvider;
use crate::config::SyncConfig;
use crate::remote::RemoteDirectory;
use crate::storage::LocalStore;
use crmsync_api::{
    AccessToken, CohortError, CohortSuccess, Contact, ContactFilter, JobId, OutboundReport,
};

/// Pushes un-linked local contacts to the remote directory in bounded cohorts
///
/// Cohorts run strictly one after another. Each one de-duplicates against the
/// remote directory before creating anything, and a failing cohort never stops
/// the ones after it. A credential failure or a cohort above the directory's
/// ceiling aborts the run after the job is completed with what was gathered.
/// A directory with a ceiling of 0 is rejected before any job is opened.
///
/// Two runs over the same backlog at the same time can race on the same rows;
/// callers are expected to schedule one run at a time.
pub struct OutboundReconciler {
    store: Arc<dyn LocalStore>,
    directory: Arc<dyn RemoteDirectory>,
    credentials: Arc<dyn CredentialProvider>,
    ledger: SyncJobLedger,
    customer_id: String,
    batch_size: usize,
}

impl OutboundReconciler {
    pub fn new(
        store: Arc<dyn LocalStore>,
        directory: Arc<dyn RemoteDirectory>,
        credentials: Arc<dyn CredentialProvider>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            ledger: SyncJobLedger::new(store.clone()),
            store,
            directory,
            credentials,
            customer_id: config.customer_id.clone(),
            batch_size: config.batch_size,
        }
    }

    /// Cohort size actually used: the configured size, capped by the directory
    pub fn cohort_size(&self) -> usize {
        self.batch_size.max(1).min(self.directory.batch_ceiling())
    }

    /// Complete the job with the partial aggregates plus `err`, then hand `err` back
    async fn abort(
        &self,
        job_id: JobId,
        index: usize,
        err: SyncError,
        success: &[CohortSuccess],
        errors: &mut Vec<CohortError>,
    ) -> SyncError {
        error!(
            "[OutboundReconciler] Cohort {} aborted job {}: {}",
            index, job_id, err
        );
        errors.push(err.to_cohort_error(index));
        if let Err(ledger_err) = self.ledger.complete(job_id, success, errors.as_slice()).await {
            error!(
                "[OutboundReconciler] Failed to complete aborted job {}: {}",
                job_id, ledger_err
            );
        }
        err
    }

    #[tracing::instrument(
        name = "sync.outbound",
        skip(self),
        fields(
            sync.directory = self.directory.directory_name(),
            sync.job_id = tracing::field::Empty,
            sync.backlog = tracing::field::Empty,
            sync.cohorts = tracing::field::Empty,
            sync.created = tracing::field::Empty,
            sync.errors = tracing::field::Empty,
        )
    )]
    pub async fn run_outbound_sync(&self) -> Result<OutboundReport> {
        let cohort_size = self.cohort_size();
        if cohort_size == 0 {
            return Err(SyncError::ZeroBatchCeiling(
                self.directory.directory_name().to_string(),
            ));
        }

        let mut remaining = self.store.find_contacts(ContactFilter::Unlinked).await?;
        let job_id = self.ledger.open(Utc::now()).await?;
        let backlog = remaining.len();

        let span = Span::current();
        span.record("sync.job_id", job_id);
        span.record("sync.backlog", backlog);
        info!(
            "[OutboundReconciler] Starting job {} with {} unsynced contacts",
            job_id, backlog
        );

        let mut success: Vec<CohortSuccess> = Vec::new();
        let mut errors: Vec<CohortError> = Vec::new();
        let mut index = 0;

        while !remaining.is_empty() {
            let take = cohort_size.min(remaining.len());
            let contacts: Vec<Contact> = remaining.drain(..take).collect();

            let token = match self.credentials.access_token(&self.customer_id).await {
                Ok(token) => token,
                Err(e) => {
                    let err = SyncError::Auth(e);
                    return Err(self.abort(job_id, index, err, &success, &mut errors).await);
                }
            };

            let report = match self.reconcile_cohort(index, contacts, &token).await {
                Ok(report) => report,
                Err(err) => {
                    return Err(self.abort(job_id, index, err, &success, &mut errors).await);
                }
            };
            info!(
                "[OutboundReconciler] Cohort {} done: {} created, {} known, {} linked, {} errors; {} contacts remaining",
                index,
                report.created(),
                report.known,
                report.linked,
                report.errors.len(),
                remaining.len()
            );
            success.extend(report.success);
            errors.extend(report.errors);
            index += 1;
        }

        self.ledger.complete(job_id, &success, &errors).await?;

        let created: usize = success.iter().map(CohortSuccess::created_count).sum();
        span.record("sync.cohorts", index);
        span.record("sync.created", created);
        span.record("sync.errors", errors.len());
        info!(
            "[OutboundReconciler] Job {} finished: {} cohorts, {} successes, {} errors",
            job_id,
            index,
            success.len(),
            errors.len()
        );

        Ok(OutboundReport {
            job_id,
            backlog,
            success,
            errors,
        })
    }

    /// Run one cohort through read, de-dup, create and write-back
    ///
    /// Only a cohort larger than the ceiling is an `Err`; every remote or
    /// write-back failure is captured in the returned report.
    pub async fn reconcile_cohort(
        &self,
        index: usize,
        contacts: Vec<Contact>,
        token: &AccessToken,
    ) -> Result<CohortReport> {
        let cohort = SyncCohort::new(index, contacts, self.directory.batch_ceiling())?;
        debug!(
            "[OutboundReconciler] Cohort {}: {} contacts, {} with email",
            index,
            cohort.len(),
            cohort.identity_map().len()
        );

        let directory = self.directory.as_ref();
        let report = cohort
            .read(directory, token)
            .await
            .remove_known()
            .create(directory, token)
            .await
            .write_back(self.store.as_ref())
            .await;
        Ok(report)
    }
}
