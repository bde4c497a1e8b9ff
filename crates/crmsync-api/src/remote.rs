use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PROPERTY_EMAIL: &str = "email";
pub const PROPERTY_FIRST_NAME: &str = "firstname";
pub const PROPERTY_LAST_NAME: &str = "lastname";

/// The properties the engine projects into a local `Contact`
pub const CONTACT_PROPERTIES: [&str; 3] = [PROPERTY_EMAIL, PROPERTY_FIRST_NAME, PROPERTY_LAST_NAME];

/// Snapshot of a contact held by the remote CRM
///
/// Only `id` and the email/name properties are read by the engine; everything else
/// in `properties` is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteContactRecord {
    pub id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived: bool,
}

impl RemoteContactRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
            created_at: None,
            updated_at: None,
            archived: false,
        }
    }

    pub fn with_property(mut self, name: &str, value: impl Into<String>) -> Self {
        self.properties.insert(name.to_string(), Some(value.into()));
        self
    }

    /// Non-empty string value of a property
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(|v| v.as_deref())
            .filter(|v| !v.is_empty())
    }

    pub fn email(&self) -> Option<&str> {
        self.property(PROPERTY_EMAIL)
    }

    pub fn first_name(&self) -> Option<&str> {
        self.property(PROPERTY_FIRST_NAME)
    }

    pub fn last_name(&self) -> Option<&str> {
        self.property(PROPERTY_LAST_NAME)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Pending,
    Processing,
    Canceled,
    Complete,
}

/// Per-record failure reported inside an otherwise successful batch call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecordError {
    pub status: String,
    #[serde(default)]
    pub category: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Vec<String>>,
}

/// Output of a batch read or batch create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub status: BatchStatus,
    #[serde(default)]
    pub results: Vec<RemoteContactRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RemoteRecordError>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl BatchResponse {
    pub fn complete(results: Vec<RemoteContactRecord>, started_at: DateTime<Utc>) -> Self {
        Self {
            status: BatchStatus::Complete,
            results,
            errors: Vec::new(),
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Parameters of `listAll`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub page_size: usize,
    pub after: Option<String>,
    pub properties: Vec<String>,
    pub archived: bool,
}

impl ListRequest {
    pub fn contacts(page_size: usize) -> Self {
        Self {
            page_size,
            after: None,
            properties: CONTACT_PROPERTIES.iter().map(|p| p.to_string()).collect(),
            archived: false,
        }
    }
}

/// Parameters of `batchRead`: look up records by `id_property` (e.g. `email`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReadRequest {
    pub id_property: String,
    pub ids: Vec<String>,
    pub properties: Vec<String>,
}

impl BatchReadRequest {
    pub fn by_email(emails: Vec<String>) -> Self {
        Self {
            id_property: PROPERTY_EMAIL.to_string(),
            ids: emails,
            properties: CONTACT_PROPERTIES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// One contact to create remotely. Only non-empty properties are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContactInput {
    pub properties: BTreeMap<String, String>,
}

impl CreateContactInput {
    pub fn email(&self) -> Option<&str> {
        self.properties.get(PROPERTY_EMAIL).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_parses_remote_shape() {
        let json = r#"{
            "id": "R9",
            "properties": {"email": "c@x.com", "firstname": "C", "lastname": null, "hs_object_id": "R9"},
            "createdAt": "2024-01-02T03:04:05.000Z",
            "updatedAt": "2024-01-02T03:04:05.000Z",
            "archived": false
        }"#;
        let record: RemoteContactRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "R9");
        assert_eq!(record.email(), Some("c@x.com"));
        assert_eq!(record.first_name(), Some("C"));
        assert_eq!(record.last_name(), None);
        assert_eq!(record.property("hs_object_id"), Some("R9"));
    }

    #[test]
    fn test_empty_property_reads_as_absent() {
        let record = RemoteContactRecord::new("R1").with_property(PROPERTY_EMAIL, "");
        assert_eq!(record.email(), None);
    }

    #[test]
    fn test_batch_response_with_errors() {
        let json = r#"{
            "status": "COMPLETE",
            "results": [],
            "errors": [{"status": "error", "category": "VALIDATION_ERROR", "message": "Property values were not valid", "context": {"email": ["bad"]}}],
            "startedAt": "2024-01-02T03:04:05Z",
            "completedAt": "2024-01-02T03:04:06Z"
        }"#;
        let response: BatchResponse = serde_json::from_str(json).unwrap();
        assert!(response.has_errors());
        assert_eq!(response.errors[0].category, "VALIDATION_ERROR");
        assert_eq!(response.status, BatchStatus::Complete);
    }
}
