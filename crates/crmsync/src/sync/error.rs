use thiserror::Error;

use crate::auth::AuthExchangeError;
use crate::remote::RemoteError;
use crate::storage::StoreError;
use crmsync_api::{CohortError, CohortErrorKind, RemoteRecordError};

/// Errors of both sync directions
///
/// Cohort-level variants (`RemoteRead`, `RemoteCreate`, `CreateRejected`,
/// `WriteBack`) are recorded in the run aggregates and never abort a run.
/// The others abort the run and reach the caller.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Credential exchange failed: {0}")]
    Auth(#[from] AuthExchangeError),

    #[error("Cohort of {size} contacts exceeds the batch ceiling of {ceiling}")]
    CohortTooLarge { size: usize, ceiling: usize },

    #[error("Remote directory '{0}' accepts no records per batch")]
    ZeroBatchCeiling(String),

    #[error("Listing remote contacts failed: {0}")]
    RemoteList(#[source] RemoteError),

    #[error("De-dup read failed: {0}")]
    RemoteRead(#[source] RemoteError),

    #[error("Batch create failed: {0}")]
    RemoteCreate(#[source] RemoteError),

    #[error("Batch create rejected {} record(s)", .errors.len())]
    CreateRejected { errors: Vec<RemoteRecordError> },

    #[error("Cannot write back remote id {remote_id}: {reason}")]
    WriteBack { remote_id: String, reason: String },

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync job ledger error: {0}")]
    Ledger(String),
}

impl SyncError {
    /// Aggregate category, for errors that are recorded per cohort
    pub fn cohort_kind(&self) -> Option<CohortErrorKind> {
        match self {
            SyncError::RemoteRead(_) => Some(CohortErrorKind::RemoteRead),
            SyncError::RemoteCreate(_) | SyncError::CreateRejected { .. } => {
                Some(CohortErrorKind::RemoteCreate)
            }
            SyncError::WriteBack { .. } => Some(CohortErrorKind::WriteBack),
            SyncError::Auth(_) => Some(CohortErrorKind::Auth),
            SyncError::CohortTooLarge { .. } => Some(CohortErrorKind::Ceiling),
            _ => None,
        }
    }

    pub fn to_cohort_error(&self, cohort: usize) -> CohortError {
        let details = match self {
            SyncError::CreateRejected { errors } => errors.clone(),
            _ => Vec::new(),
        };
        CohortError {
            cohort,
            kind: self.cohort_kind().unwrap_or(CohortErrorKind::RemoteCreate),
            message: self.to_string(),
            details,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
