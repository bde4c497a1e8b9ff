//! In-memory collaborators for tests and offline runs
//!
//! - `FakeRemoteDirectory` - a remote contact directory held in memory, with
//!   switches to make individual calls fail
//! - `StaticCredentialProvider` - hands out a fixed token, optionally failing
//!   after a number of calls
//! - `FakeTokenExchanger` - a token endpoint that records the grants it receives

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::auth::{AuthExchangeError, CredentialProvider, GrantRequest, TokenExchanger};
use crate::remote::{RemoteDirectory, RemoteError, MAX_BATCH_SIZE};
use crmsync_api::{
    AccessToken, BatchReadRequest, BatchResponse, CreateContactInput, ListRequest,
    RemoteContactRecord, RemoteRecordError, TokenGrant, PROPERTY_EMAIL,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct DirectoryState {
    records: BTreeMap<u64, RemoteContactRecord>,
    next_id: u64,
    fail_lists: bool,
    fail_reads: bool,
    /// 1-based create call numbers that fail outright
    failing_create_calls: BTreeSet<usize>,
    rejected_emails: BTreeSet<String>,
    strip_created_emails: bool,
    created_emails: Vec<String>,
}

impl DirectoryState {
    fn allocate_id(&mut self) -> (u64, String) {
        self.next_id += 1;
        let key = 1000 + self.next_id;
        (key, format!("R{key}"))
    }

    fn find_by_email(&self, email: &str) -> Option<&RemoteContactRecord> {
        self.records.values().find(|r| r.email() == Some(email))
    }
}

/// Remote contact directory held in memory
///
/// Created records get ids `R1001`, `R1002`, ... in creation order.
#[derive(Debug)]
pub struct FakeRemoteDirectory {
    state: Mutex<DirectoryState>,
    batch_ceiling: usize,
    list_calls: AtomicUsize,
    read_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl Default for FakeRemoteDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemoteDirectory {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DirectoryState::default()),
            batch_ceiling: MAX_BATCH_SIZE,
            list_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_batch_ceiling(mut self, ceiling: usize) -> Self {
        self.batch_ceiling = ceiling;
        self
    }

    /// Add an existing remote record as-is
    pub fn insert(&self, record: RemoteContactRecord) {
        let mut state = lock(&self.state);
        let (key, _) = state.allocate_id();
        state.records.insert(key, record);
    }

    pub fn records(&self) -> Vec<RemoteContactRecord> {
        lock(&self.state).records.values().cloned().collect()
    }

    pub fn record_by_email(&self, email: &str) -> Option<RemoteContactRecord> {
        lock(&self.state).find_by_email(email).cloned()
    }

    pub fn fail_lists(&self) {
        lock(&self.state).fail_lists = true;
    }

    pub fn fail_reads(&self) {
        lock(&self.state).fail_reads = true;
    }

    /// Make the `n`-th batch-create call (1-based) fail with an HTTP error
    pub fn fail_create_call(&self, n: usize) {
        lock(&self.state).failing_create_calls.insert(n);
    }

    /// Reject this email inside an otherwise successful batch create
    pub fn reject_email(&self, email: &str) {
        lock(&self.state).rejected_emails.insert(email.to_string());
    }

    /// Return created records without their email property
    pub fn drop_emails_from_create_results(&self) {
        lock(&self.state).strip_created_emails = true;
    }

    /// Every email sent in a batch create, in call order
    pub fn created_emails(&self) -> Vec<String> {
        lock(&self.state).created_emails.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn http_error(path: &str, status: u16, message: &str) -> RemoteError {
        RemoteError::Http {
            status,
            url: format!("fake://{path}"),
            message: message.to_string(),
        }
    }

    fn project(record: &RemoteContactRecord, properties: &[String]) -> RemoteContactRecord {
        let mut projected = record.clone();
        projected
            .properties
            .retain(|name, _| properties.iter().any(|p| p == name));
        projected
    }
}

#[async_trait]
impl RemoteDirectory for FakeRemoteDirectory {
    fn directory_name(&self) -> &str {
        "fake"
    }

    fn batch_ceiling(&self) -> usize {
        self.batch_ceiling
    }

    async fn list_all(
        &self,
        _token: &AccessToken,
        request: ListRequest,
    ) -> Result<Vec<RemoteContactRecord>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = lock(&self.state);
        if state.fail_lists {
            return Err(Self::http_error("contacts", 503, "service unavailable"));
        }

        // Walk page by page the way a paginated API would be consumed
        let page_size = request.page_size.max(1);
        let mut after = request.after.and_then(|a| a.parse::<u64>().ok()).unwrap_or(0);
        let mut records = Vec::new();
        loop {
            let page: Vec<(u64, &RemoteContactRecord)> = state
                .records
                .range(after + 1..)
                .filter(|(_, r)| request.archived || !r.archived)
                .take(page_size)
                .map(|(k, r)| (*k, r))
                .collect();
            let Some((last, _)) = page.last().copied() else {
                break;
            };
            let full = page.len() == page_size;
            records.extend(page.into_iter().map(|(_, r)| Self::project(r, &request.properties)));
            if !full {
                break;
            }
            after = last;
        }
        Ok(records)
    }

    async fn batch_read(
        &self,
        _token: &AccessToken,
        request: BatchReadRequest,
    ) -> Result<BatchResponse, RemoteError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let state = lock(&self.state);
        if state.fail_reads {
            return Err(Self::http_error("contacts/batch/read", 502, "bad gateway"));
        }

        let started_at = Utc::now();
        let mut results = Vec::new();
        let mut missing = Vec::new();
        for id in &request.ids {
            let found = state
                .records
                .values()
                .find(|r| r.property(&request.id_property) == Some(id.as_str()));
            match found {
                Some(record) => results.push(Self::project(record, &request.properties)),
                None => missing.push(id.clone()),
            }
        }

        let mut response = BatchResponse::complete(results, started_at);
        if !missing.is_empty() {
            response.errors.push(RemoteRecordError {
                status: "error".to_string(),
                category: "OBJECT_NOT_FOUND".to_string(),
                message: "Could not get some CONTACT objects, they may be deleted or not exist."
                    .to_string(),
                context: [("ids".to_string(), missing)].into_iter().collect(),
            });
        }
        Ok(response)
    }

    async fn batch_create(
        &self,
        _token: &AccessToken,
        inputs: Vec<CreateContactInput>,
    ) -> Result<BatchResponse, RemoteError> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if inputs.len() > self.batch_ceiling {
            return Err(Self::http_error("contacts/batch/create", 400, "too many inputs"));
        }

        let mut state = lock(&self.state);
        if state.failing_create_calls.contains(&call) {
            return Err(Self::http_error("contacts/batch/create", 500, "internal error"));
        }

        let started_at = Utc::now();
        let mut results = Vec::new();
        let mut errors = Vec::new();
        for input in inputs {
            let email = input.email().map(str::to_string);
            if let Some(email) = &email {
                state.created_emails.push(email.clone());
                if state.rejected_emails.contains(email) {
                    errors.push(RemoteRecordError {
                        status: "error".to_string(),
                        category: "VALIDATION_ERROR".to_string(),
                        message: format!("Property values were not valid: {email}"),
                        context: Default::default(),
                    });
                    continue;
                }
            }

            let (key, id) = state.allocate_id();
            let mut record = RemoteContactRecord::new(id);
            for (name, value) in input.properties {
                record = record.with_property(&name, value);
            }
            state.records.insert(key, record.clone());

            if state.strip_created_emails {
                record.properties.remove(PROPERTY_EMAIL);
            }
            results.push(record);
        }

        let mut response = BatchResponse::complete(results, started_at);
        response.errors = errors;
        Ok(response)
    }
}

/// Credential provider with a fixed token
#[derive(Debug)]
pub struct StaticCredentialProvider {
    token: String,
    /// Calls allowed to succeed before every call fails; `None` never fails
    fail_after: Option<usize>,
    calls: AtomicUsize,
}

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            fail_after: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::new("").fail_after(0)
    }

    pub fn fail_after(mut self, successful_calls: usize) -> Self {
        self.fail_after = Some(successful_calls);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn access_token(&self, customer_id: &str) -> Result<AccessToken, AuthExchangeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_after {
            Some(limit) if call >= limit => Err(AuthExchangeError::Rejected {
                status: 400,
                message: format!("refresh token for {customer_id} was revoked"),
            }),
            _ => Ok(AccessToken::new(self.token.clone())),
        }
    }
}

/// Token endpoint double; every accepted grant yields the same token pair
#[derive(Debug)]
pub struct FakeTokenExchanger {
    access_token: String,
    reject: bool,
    grants: Mutex<Vec<GrantRequest>>,
}

impl FakeTokenExchanger {
    pub const PORTAL_ID: &'static str = "portal-1";

    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            reject: false,
            grants: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::new("")
        }
    }

    pub fn grants(&self) -> Vec<GrantRequest> {
        lock(&self.grants).clone()
    }
}

#[async_trait]
impl TokenExchanger for FakeTokenExchanger {
    async fn exchange(&self, grant: GrantRequest) -> Result<TokenGrant, AuthExchangeError> {
        lock(&self.grants).push(grant);
        if self.reject {
            return Err(AuthExchangeError::Rejected {
                status: 400,
                message: "BAD_REFRESH_TOKEN".to_string(),
            });
        }
        Ok(TokenGrant {
            access_token: self.access_token.clone(),
            refresh_token: format!("{}-refresh", self.access_token),
            expires_in: 1800,
        })
    }

    async fn portal_id(&self, _token: &AccessToken) -> Result<String, AuthExchangeError> {
        Ok(Self::PORTAL_ID.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_api::PROPERTY_FIRST_NAME;

    fn token() -> AccessToken {
        AccessToken::new("t")
    }

    #[tokio::test]
    async fn test_list_all_walks_every_page() {
        let directory = FakeRemoteDirectory::new();
        for i in 0..5 {
            directory.insert(
                RemoteContactRecord::new(format!("E{i}"))
                    .with_property(PROPERTY_EMAIL, format!("{i}@x.com")),
            );
        }

        let records = directory
            .list_all(&token(), ListRequest::contacts(2))
            .await
            .unwrap();
        assert_eq!(records.len(), 5);
    }

    #[tokio::test]
    async fn test_batch_read_reports_unknown_ids() {
        let directory = FakeRemoteDirectory::new();
        directory.insert(RemoteContactRecord::new("R1").with_property(PROPERTY_EMAIL, "a@x.com"));

        let response = directory
            .batch_read(
                &token(),
                BatchReadRequest::by_email(vec!["a@x.com".into(), "zz@x.com".into()]),
            )
            .await
            .unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].id, "R1");
        assert_eq!(response.errors[0].category, "OBJECT_NOT_FOUND");
        assert_eq!(response.errors[0].context["ids"], vec!["zz@x.com".to_string()]);
    }

    #[tokio::test]
    async fn test_batch_create_assigns_sequential_ids() {
        let directory = FakeRemoteDirectory::new();
        let input = |email: &str| CreateContactInput {
            properties: [
                (PROPERTY_EMAIL.to_string(), email.to_string()),
                (PROPERTY_FIRST_NAME.to_string(), "F".to_string()),
            ]
            .into_iter()
            .collect(),
        };

        let response = directory
            .batch_create(&token(), vec![input("a@x.com"), input("b@x.com")])
            .await
            .unwrap();

        let ids: Vec<_> = response.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["R1001", "R1002"]);
        assert_eq!(directory.created_emails(), vec!["a@x.com", "b@x.com"]);
    }

    #[tokio::test]
    async fn test_static_provider_fails_after_limit() {
        let provider = StaticCredentialProvider::new("t").fail_after(1);
        assert!(provider.access_token("c1").await.is_ok());
        assert!(provider.access_token("c1").await.is_err());
        assert_eq!(provider.calls(), 2);
    }
}
