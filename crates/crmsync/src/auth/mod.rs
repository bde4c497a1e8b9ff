//! Credential acquisition for remote calls
//!
//! - `CredentialProvider` - hands out a valid bearer token for a customer
//! - `TokenExchanger` - the remote token endpoint (implemented in `crmsync-hubspot`)
//! - `OAuthCredentialProvider` - cached-or-refresh logic over a `CredentialStore`

mod provider;

pub use provider::OAuthCredentialProvider;

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::StoreError;
use crmsync_api::{AccessToken, TokenGrant};

/// Token refresh or code redemption failed. Fatal to the current sync run.
#[derive(Debug, Error)]
pub enum AuthExchangeError {
    #[error("No refresh token stored for customer {customer_id}")]
    MissingRefreshToken { customer_id: String },

    #[error("Token endpoint rejected the exchange (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Token exchange transport error: {0}")]
    Transport(String),

    #[error("Failed to decode token response: {0}")]
    Decode(String),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),
}

/// OAuth grant presented to the token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantRequest {
    AuthorizationCode { code: String },
    RefreshToken { refresh_token: String },
}

impl GrantRequest {
    pub fn grant_type(&self) -> &'static str {
        match self {
            GrantRequest::AuthorizationCode { .. } => "authorization_code",
            GrantRequest::RefreshToken { .. } => "refresh_token",
        }
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A bearer token valid now, refreshed and persisted first if needed
    async fn access_token(&self, customer_id: &str) -> Result<AccessToken, AuthExchangeError>;
}

#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, grant: GrantRequest) -> Result<TokenGrant, AuthExchangeError>;

    /// Remote account (portal) identifier the token belongs to
    async fn portal_id(&self, token: &AccessToken) -> Result<String, AuthExchangeError>;
}
