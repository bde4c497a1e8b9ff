use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contact::ContactId;
use crate::remote::{BatchResponse, RemoteRecordError};

pub type JobId = i64;

/// Durable ledger row for one outbound run
///
/// Created when the run starts and completed exactly once when it ends. The
/// payloads are the JSON-serialized run aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    pub id: JobId,
    pub execution_time: DateTime<Utc>,
    pub success: Option<String>,
    pub failures: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// How one remote record was reconciled into the local store during an inbound run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InboundOutcome {
    #[serde(rename = "upsert")]
    Upsert,
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "hsID_updated")]
    RemoteIdUpdated,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "errors")]
    Error,
}

impl InboundOutcome {
    pub const ALL: [InboundOutcome; 5] = [
        InboundOutcome::Upsert,
        InboundOutcome::Created,
        InboundOutcome::RemoteIdUpdated,
        InboundOutcome::Failed,
        InboundOutcome::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InboundOutcome::Upsert => "upsert",
            InboundOutcome::Created => "created",
            InboundOutcome::RemoteIdUpdated => "hsID_updated",
            InboundOutcome::Failed => "failed",
            InboundOutcome::Error => "errors",
        }
    }
}

/// Per-contact result record kept in the inbound tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSyncRecord {
    /// `None` when no local row was written
    pub local_id: Option<ContactId>,
    pub remote_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub outcome: InboundOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub count: usize,
    pub records: Vec<ContactSyncRecord>,
}

/// Inbound tally keyed by outcome category. Returned to the caller, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunResult {
    pub upsert: OutcomeTally,
    pub created: OutcomeTally,
    #[serde(rename = "hsID_updated")]
    pub remote_id_updated: OutcomeTally,
    pub failed: OutcomeTally,
    pub errors: OutcomeTally,
}

impl JobRunResult {
    pub fn record(&mut self, record: ContactSyncRecord) {
        let tally = self.tally_mut(record.outcome);
        tally.count += 1;
        tally.records.push(record);
    }

    pub fn tally(&self, outcome: InboundOutcome) -> &OutcomeTally {
        match outcome {
            InboundOutcome::Upsert => &self.upsert,
            InboundOutcome::Created => &self.created,
            InboundOutcome::RemoteIdUpdated => &self.remote_id_updated,
            InboundOutcome::Failed => &self.failed,
            InboundOutcome::Error => &self.errors,
        }
    }

    fn tally_mut(&mut self, outcome: InboundOutcome) -> &mut OutcomeTally {
        match outcome {
            InboundOutcome::Upsert => &mut self.upsert,
            InboundOutcome::Created => &mut self.created,
            InboundOutcome::RemoteIdUpdated => &mut self.remote_id_updated,
            InboundOutcome::Failed => &mut self.failed,
            InboundOutcome::Error => &mut self.errors,
        }
    }

    pub fn count(&self, outcome: InboundOutcome) -> usize {
        self.tally(outcome).count
    }

    pub fn total(&self) -> usize {
        InboundOutcome::ALL.iter().map(|o| self.count(*o)).sum()
    }
}

/// What `runInboundSync` hands back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReport {
    /// Number of remote records fetched
    pub total: usize,
    pub results: JobRunResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortErrorKind {
    RemoteRead,
    RemoteCreate,
    WriteBack,
    Auth,
    /// The cohort did not fit under the directory's batch ceiling
    Ceiling,
}

/// One entry of the outbound failure aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortError {
    /// Zero-based position of the cohort within the run
    pub cohort: usize,
    pub kind: CohortErrorKind,
    pub message: String,
    /// Per-record errors reported by the remote inside a batch response
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<RemoteRecordError>,
}

/// One entry of the outbound success aggregate: a cohort's batch-create output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortSuccess {
    pub cohort: usize,
    pub output: BatchResponse,
}

impl CohortSuccess {
    pub fn created_count(&self) -> usize {
        self.output.results.len()
    }
}

/// What `runOutboundSync` hands back. Both collections must be inspected: an
/// empty `errors` does not mean every backlog row was linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundReport {
    pub job_id: JobId,
    /// Size of the un-linked backlog when the run started
    pub backlog: usize,
    pub success: Vec<CohortSuccess>,
    pub errors: Vec<CohortError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(outcome: InboundOutcome) -> ContactSyncRecord {
        ContactSyncRecord {
            local_id: Some(1),
            remote_id: "R1".into(),
            email: None,
            first_name: None,
            last_name: None,
            outcome,
            error: None,
        }
    }

    #[test]
    fn test_tally_counts_by_outcome() {
        let mut result = JobRunResult::default();
        result.record(record(InboundOutcome::Upsert));
        result.record(record(InboundOutcome::Upsert));
        result.record(record(InboundOutcome::Created));

        assert_eq!(result.count(InboundOutcome::Upsert), 2);
        assert_eq!(result.count(InboundOutcome::Created), 1);
        assert_eq!(result.count(InboundOutcome::Error), 0);
        assert_eq!(result.total(), 3);
        assert_eq!(result.upsert.records.len(), 2);
    }

    #[test]
    fn test_tally_serializes_with_category_keys() {
        let mut result = JobRunResult::default();
        result.record(record(InboundOutcome::RemoteIdUpdated));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["hsID_updated"]["count"], 1);
        assert_eq!(json["hsID_updated"]["records"][0]["outcome"], "hsID_updated");
        assert!(json.get("upsert").is_some());
        assert!(json.get("errors").is_some());
    }
}
