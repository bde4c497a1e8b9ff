//! Bidirectional contact synchronization between a local store and a remote CRM
//!
//! The engine only talks to its collaborators through traits:
//! [`storage::LocalStore`], [`storage::CredentialStore`],
//! [`remote::RemoteDirectory`] and [`auth::CredentialProvider`]. The process
//! entry point builds the concrete values and hands them to
//! [`sync::InboundSync`] and [`sync::OutboundReconciler`].

pub mod auth;
pub mod config;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod testing;

pub use config::{ConfigError, SyncConfig};
pub use sync::{InboundSync, OutboundReconciler, SyncError, SyncJobLedger};
