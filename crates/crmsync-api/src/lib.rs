//! Data model shared by the contact sync engine and its remote integrations
//!
//! - `contact` - local contact rows and the shapes used to create/update/select them
//! - `remote` - remote contact snapshots and batch request/response shapes
//! - `job` - sync job ledger rows and run aggregates for both directions
//! - `credentials` - stored OAuth credentials and bearer tokens

pub mod contact;
pub mod credentials;
pub mod job;
pub mod remote;

pub use contact::{Contact, ContactFilter, ContactId, ContactPatch, NewContact, Upserted};
pub use credentials::{expires_at, AccessToken, Credentials, TokenGrant};
pub use job::{
    CohortError, CohortErrorKind, CohortSuccess, ContactSyncRecord, InboundOutcome,
    InboundReport, JobId, JobRunResult, OutboundReport, OutcomeTally, SyncJob,
};
pub use remote::{
    BatchReadRequest, BatchResponse, BatchStatus, CreateContactInput, ListRequest,
    RemoteContactRecord, RemoteRecordError, CONTACT_PROPERTIES, PROPERTY_EMAIL,
    PROPERTY_FIRST_NAME, PROPERTY_LAST_NAME,
};
