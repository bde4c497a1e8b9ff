//! Contract of the remote contact directory
//!
//! Implemented over HTTP by `crmsync-hubspot` and in memory by
//! `testing::FakeRemoteDirectory`. Rate limiting is the implementation's concern:
//! every call made through one directory value shares its limiter.

use async_trait::async_trait;
use thiserror::Error;

use crmsync_api::{
    AccessToken, BatchReadRequest, BatchResponse, CreateContactInput, ListRequest,
    RemoteContactRecord,
};

/// Maximum number of records per batch read/create request
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("HTTP {status} error from {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Identifier used in logs (e.g. "hubspot", "fake")
    fn directory_name(&self) -> &str;

    /// Largest batch the directory accepts for `batch_read`/`batch_create`
    fn batch_ceiling(&self) -> usize {
        MAX_BATCH_SIZE
    }

    /// Fetch the whole contact collection, starting at `request.after` and
    /// following continuation cursors until the collection is exhausted
    async fn list_all(
        &self,
        token: &AccessToken,
        request: ListRequest,
    ) -> Result<Vec<RemoteContactRecord>, RemoteError>;

    async fn batch_read(
        &self,
        token: &AccessToken,
        request: BatchReadRequest,
    ) -> Result<BatchResponse, RemoteError>;

    /// Create contacts. Per-record failures come back in `BatchResponse::errors`.
    async fn batch_create(
        &self,
        token: &AccessToken,
        inputs: Vec<CreateContactInput>,
    ) -> Result<BatchResponse, RemoteError>;
}
