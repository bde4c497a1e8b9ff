//! Both sync directions
//!
//! - `InboundSync` - pull every remote contact into the local store
//! - `OutboundReconciler` - push un-linked local contacts in bounded cohorts
//! - `SyncJobLedger` - durable per-run record of outbound results

pub mod cohort;
mod error;
pub mod identity;
mod inbound;
mod ledger;
mod outbound;

pub use cohort::{CohortReport, CreatedCohort, NetNewCohort, ReadCohort, SyncCohort};
pub use error::{Result, SyncError};
pub use identity::IdentityMap;
pub use inbound::InboundSync;
pub use ledger::SyncJobLedger;
pub use outbound::OutboundReconciler;
