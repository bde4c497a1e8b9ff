use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stored OAuth credentials for one customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub customer_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds granted by the token endpoint
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
    pub remote_portal_id: Option<String>,
}

impl Credentials {
    /// A token whose expiry is at or before `now` must be refreshed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Compute the absolute expiry for a token granted at `issued_at`
pub fn expires_at(issued_at: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    issued_at + Duration::seconds(expires_in)
}

/// A token pair returned by the remote token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Bearer token handed to remote calls
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep bearer tokens out of logs
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}
