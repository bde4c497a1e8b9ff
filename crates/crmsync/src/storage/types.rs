use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A write collided with a uniqueness constraint (e.g. the unique email)
    #[error("Constraint violation on {field}: {value}")]
    ConstraintViolation { field: String, value: String },

    #[error("Entity not found: {entity} with key {key}")]
    NotFound { entity: String, key: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn not_found(entity: &str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: entity.to_string(),
            key: key.into(),
        }
    }

    /// A second completion of a sync job that already has its aggregates
    pub fn already_completed(job_id: i64) -> Self {
        StoreError::ConstraintViolation {
            field: "sync_jobs.completed_at".to_string(),
            value: job_id.to_string(),
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
