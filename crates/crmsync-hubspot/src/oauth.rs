use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use super::client::HubSpotTransport;
use super::config::HubSpotConfig;
use super::models::{AccountInfo, TokenResponse};
use crmsync::auth::{AuthExchangeError, GrantRequest, TokenExchanger};
use crmsync::remote::RemoteError;
use crmsync_api::{AccessToken, TokenGrant};

const TOKEN_PATH: &str = "/oauth/v1/token";
const ACCOUNT_INFO_PATH: &str = "/account-info/v3/details";

/// HubSpot OAuth v1 token endpoint
pub struct HubSpotOAuth {
    transport: Arc<HubSpotTransport>,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl HubSpotOAuth {
    pub fn new(transport: Arc<HubSpotTransport>, config: &HubSpotConfig) -> Self {
        Self {
            transport,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri(),
        }
    }

    /// Form fields for one grant
    pub fn token_form<'a>(&'a self, grant: &'a GrantRequest) -> Vec<(&'static str, &'a str)> {
        let mut form = vec![
            ("grant_type", grant.grant_type()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        match grant {
            GrantRequest::AuthorizationCode { code } => form.push(("code", code.as_str())),
            GrantRequest::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token.as_str()))
            }
        }
        form
    }
}

fn auth_error(e: RemoteError) -> AuthExchangeError {
    match e {
        RemoteError::Http { status, message, .. } => AuthExchangeError::Rejected { status, message },
        RemoteError::Transport(message) => AuthExchangeError::Transport(message),
        RemoteError::Decode(message) => AuthExchangeError::Decode(message),
    }
}

#[async_trait]
impl TokenExchanger for HubSpotOAuth {
    async fn exchange(&self, grant: GrantRequest) -> Result<TokenGrant, AuthExchangeError> {
        debug!("[HubSpotOAuth] Exchanging {} grant", grant.grant_type());
        let form = self.token_form(&grant);
        let response: TokenResponse = self
            .transport
            .post_form(TOKEN_PATH, &form, "exchange tokens")
            .await
            .map_err(|e| {
                error!(
                    "[HubSpotOAuth] Error exchanging {} for access token: {}",
                    grant.grant_type(),
                    e
                );
                auth_error(e)
            })?;
        Ok(response.into())
    }

    async fn portal_id(&self, token: &AccessToken) -> Result<String, AuthExchangeError> {
        let info: AccountInfo = self
            .transport
            .get_json(ACCOUNT_INFO_PATH, Some(token), &[], "get account info")
            .await
            .map_err(auth_error)?;
        Ok(info.portal_id.to_string())
    }
}
