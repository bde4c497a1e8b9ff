//! Engine configuration: optional YAML file, then environment overrides

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::remote::MAX_BATCH_SIZE;
use crmsync_api::CONTACT_PROPERTIES;

pub const ENV_CUSTOMER_ID: &str = "CUSTOMER_ID";
pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is missing, please add it to your environment or config file")]
    Missing(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Read and parse a YAML config file
pub fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// The single customer whose credentials both sync directions use
    pub customer_id: String,
    /// Outbound cohort size; must not exceed the remote batch ceiling
    pub batch_size: usize,
    /// Page size for listing remote contacts during an inbound run
    pub page_size: usize,
    pub inbound_properties: Vec<String>,
    pub include_archived: bool,
    /// Inbound: try create first and fall back to a remote-id update on a unique-email clash
    pub verbose_create_or_update: bool,
    pub database_path: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            customer_id: String::new(),
            batch_size: MAX_BATCH_SIZE,
            page_size: 100,
            inbound_properties: CONTACT_PROPERTIES.iter().map(|p| p.to_string()).collect(),
            include_archived: false,
            verbose_create_or_update: false,
            database_path: PathBuf::from("crmsync.db"),
        }
    }
}

impl SyncConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        read_yaml(path)
    }

    /// Override fields from `CUSTOMER_ID` and `DATABASE_PATH`
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(customer_id) = lookup(ENV_CUSTOMER_ID).filter(|v| !v.is_empty()) {
            self.customer_id = customer_id;
        }
        if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.customer_id.is_empty() {
            return Err(ConfigError::Missing(ENV_CUSTOMER_ID.to_string()));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid {
                field: "batch_size".to_string(),
                reason: format!("must be between 1 and {MAX_BATCH_SIZE}"),
            });
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "page_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_remote_limits() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.inbound_properties, vec!["email", "firstname", "lastname"]);
        assert!(!config.include_archived);
        assert!(!config.verbose_create_or_update);
    }

    #[test]
    fn test_yaml_fills_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "customer_id: acme\nbatch_size: 25").unwrap();

        let config = SyncConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.customer_id, "acme");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.page_size, 100);
    }

    #[test]
    fn test_unparseable_yaml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size: [not a number").unwrap();

        let err = SyncConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [("CUSTOMER_ID", "from-env"), ("DATABASE_PATH", "/tmp/x.db")]
            .into_iter()
            .collect();
        let mut config = SyncConfig {
            customer_id: "from-file".into(),
            ..SyncConfig::default()
        };
        config.apply_env_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.customer_id, "from-env");
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_validate_rejects_missing_customer_and_oversized_batches() {
        let err = SyncConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref v) if v == "CUSTOMER_ID"));

        let config = SyncConfig {
            customer_id: "acme".into(),
            batch_size: 101,
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }
}
