use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crmsync::config::{read_yaml, ConfigError};

pub const ENV_PORT: &str = "PORT";
pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const ENV_BASE_URL: &str = "HUBSPOT_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://app.hubspot.com/oauth/authorize";

/// Scopes requested at install time
pub const DEFAULT_SCOPES: [&str; 8] = [
    "crm.schemas.companies.write",
    "crm.schemas.contacts.write",
    "crm.schemas.companies.read",
    "crm.schemas.contacts.read",
    "crm.objects.companies.write",
    "crm.objects.contacts.write",
    "crm.objects.companies.read",
    "crm.objects.contacts.read",
];

/// Shared limits applied to every call made through one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls started per second; consecutive starts are spaced by `1s / requests_per_second`
    pub requests_per_second: u32,
    /// Calls in flight at once
    pub max_concurrent: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 9,
            max_concurrent: 6,
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(1) / self.requests_per_second.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSpotConfig {
    pub base_url: String,
    pub authorize_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Port of the local OAuth callback listener
    pub port: u16,
    /// Overrides `http://localhost:{port}/oauth-callback`
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub request_timeout_secs: u64,
}

impl Default for HubSpotConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            port: 3000,
            redirect_uri: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            rate_limit: RateLimitConfig::default(),
            request_timeout_secs: 30,
        }
    }
}

impl HubSpotConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        read_yaml(path)
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(client_id) = lookup(ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            self.client_id = client_id;
        }
        if let Some(secret) = lookup(ENV_CLIENT_SECRET).filter(|v| !v.is_empty()) {
            self.client_secret = secret;
        }
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = base_url;
        }
        if let Some(port) = lookup(ENV_PORT).filter(|v| !v.is_empty()) {
            self.port = port.parse().map_err(|_| ConfigError::Invalid {
                field: ENV_PORT.to_string(),
                reason: format!("'{port}' is not a port number"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::Missing(ENV_CLIENT_ID.to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::Missing(ENV_CLIENT_SECRET.to_string()));
        }
        if self.rate_limit.max_concurrent == 0 {
            return Err(ConfigError::Invalid {
                field: "rate_limit.max_concurrent".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn redirect_uri(&self) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}/oauth-callback", self.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Install URL the customer opens to grant access
    pub fn authorization_url(&self) -> Result<String, ConfigError> {
        let scope = self.scopes.join(" ");
        let redirect_uri = self.redirect_uri();
        let url = reqwest::Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", scope.as_str()),
            ],
        )
        .map_err(|e| ConfigError::Invalid {
            field: "authorize_url".to_string(),
            reason: e.to_string(),
        })?;
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_rate_limit_defaults() {
        let limits = RateLimitConfig::default();
        assert_eq!(limits.max_concurrent, 6);
        assert_eq!(limits.min_interval(), Duration::from_nanos(111_111_111));
    }

    #[test]
    fn test_missing_client_credentials() {
        let mut config = HubSpotConfig::default();
        config.apply_env_from(env(&[("CLIENT_ID", "id")])).unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref v) if v == "CLIENT_SECRET"));
        assert_eq!(
            err.to_string(),
            "CLIENT_SECRET is missing, please add it to your environment or config file"
        );
    }

    #[test]
    fn test_port_drives_redirect_uri() {
        let mut config = HubSpotConfig::default();
        config
            .apply_env_from(env(&[("PORT", "8080"), ("CLIENT_ID", "id"), ("CLIENT_SECRET", "s")]))
            .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.redirect_uri(), "http://localhost:8080/oauth-callback");
    }

    #[test]
    fn test_bad_port_is_invalid() {
        let mut config = HubSpotConfig::default();
        let err = config.apply_env_from(env(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_authorization_url_carries_client_redirect_and_scopes() {
        let config = HubSpotConfig {
            client_id: "abc".into(),
            ..HubSpotConfig::default()
        };

        let url = reqwest::Url::parse(&config.authorization_url().unwrap()).unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("app.hubspot.com"));
        assert_eq!(query["client_id"], "abc");
        assert_eq!(query["redirect_uri"], "http://localhost:3000/oauth-callback");
        assert_eq!(query["scope"].split(' ').count(), 8);
        assert!(query["scope"].contains("crm.objects.contacts.write"));
    }
}
