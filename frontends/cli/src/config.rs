use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crmsync::config::read_yaml;
use crmsync::SyncConfig;
use crmsync_hubspot::HubSpotConfig;

/// Combined config file layout:
///
/// ```yaml
/// sync:
///   customer_id: acme
///   batch_size: 100
/// hubspot:
///   client_id: ...
///   rate_limit:
///     requests_per_second: 9
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub hubspot: HubSpotConfig,
}

impl AppConfig {
    /// File (if any), then environment, then the `--db` override
    pub fn load(
        config_path: Option<&Path>,
        db_path: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => read_yaml(path)?,
            None => AppConfig::default(),
        };
        config.sync.apply_env_from(&lookup);
        config.hubspot.apply_env_from(&lookup)?;
        if let Some(db_path) = db_path {
            config.sync.database_path = db_path;
        }
        Ok(config)
    }
}
