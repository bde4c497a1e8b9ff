use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{AuthExchangeError, CredentialProvider, GrantRequest, TokenExchanger};
use crate::storage::CredentialStore;
use crmsync_api::{expires_at, AccessToken, Credentials};

/// Returns the cached access token while it is valid, otherwise exchanges the
/// stored refresh token and upserts the new pair before returning it.
pub struct OAuthCredentialProvider {
    store: Arc<dyn CredentialStore>,
    exchanger: Arc<dyn TokenExchanger>,
}

impl OAuthCredentialProvider {
    pub fn new(store: Arc<dyn CredentialStore>, exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self { store, exchanger }
    }

    pub async fn access_token_at(
        &self,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, AuthExchangeError> {
        let current = self.store.load_credentials(customer_id).await?;

        match current {
            Some(creds) if !creds.is_expired_at(now) => {
                debug!(
                    "[OAuthCredentialProvider] Using cached token for customer '{}' (expires {})",
                    customer_id, creds.expires_at
                );
                Ok(AccessToken::new(creds.access_token))
            }
            current => {
                let refresh_token = current
                    .map(|c| c.refresh_token)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| AuthExchangeError::MissingRefreshToken {
                        customer_id: customer_id.to_string(),
                    })?;
                info!(
                    "[OAuthCredentialProvider] Token for customer '{}' missing or expired, refreshing",
                    customer_id
                );
                let creds = self
                    .exchange_and_store(customer_id, GrantRequest::RefreshToken { refresh_token })
                    .await?;
                Ok(AccessToken::new(creds.access_token))
            }
        }
    }

    /// Redeem an OAuth authorization code and persist the resulting credentials
    pub async fn redeem_code(
        &self,
        customer_id: &str,
        code: &str,
    ) -> Result<Credentials, AuthExchangeError> {
        self.exchange_and_store(
            customer_id,
            GrantRequest::AuthorizationCode {
                code: code.to_string(),
            },
        )
        .await
    }

    async fn exchange_and_store(
        &self,
        customer_id: &str,
        grant: GrantRequest,
    ) -> Result<Credentials, AuthExchangeError> {
        let grant_type = grant.grant_type();
        let issued_at = Utc::now();
        let tokens = self.exchanger.exchange(grant).await.map_err(|e| {
            error!(
                "[OAuthCredentialProvider] Error exchanging {} for access token: {}",
                grant_type, e
            );
            e
        })?;

        let access_token = AccessToken::new(tokens.access_token.clone());
        let portal_id = self.exchanger.portal_id(&access_token).await?;

        let creds = Credentials {
            customer_id: customer_id.to_string(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
            expires_at: expires_at(issued_at, tokens.expires_in),
            remote_portal_id: Some(portal_id),
        };
        self.store.save_credentials(&creds).await?;
        info!(
            "[OAuthCredentialProvider] Stored new {} credentials for customer '{}'",
            grant_type, customer_id
        );
        Ok(creds)
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentialProvider {
    async fn access_token(&self, customer_id: &str) -> Result<AccessToken, AuthExchangeError> {
        self.access_token_at(customer_id, Utc::now()).await
    }
}
