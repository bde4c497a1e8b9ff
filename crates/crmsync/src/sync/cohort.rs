//! One bounded batch of un-linked local contacts, reconciled in stages
//!
//! Each stage consumes the previous stage's value and returns the next one:
//!
//! `SyncCohort` -(read)-> `ReadCohort` -(remove_known)-> `NetNewCohort`
//! -(create)-> `CreatedCohort` -(write_back)-> `CohortReport`
//!
//! The identity map (email -> local id) is owned by the cohort value and only
//! shrinks as stages learn which emails already exist remotely.

use tracing::{debug, error, info, warn};

use super::error::{Result, SyncError};
use super::identity::{self, IdentityMap};
use crate::remote::{RemoteDirectory, RemoteError};
use crate::storage::LocalStore;
use crmsync_api::{
    AccessToken, BatchReadRequest, BatchResponse, CohortError, CohortSuccess, Contact,
    CreateContactInput, RemoteContactRecord,
};

#[derive(Debug, Clone)]
pub struct SyncCohort {
    index: usize,
    contacts: Vec<Contact>,
    identity_map: IdentityMap,
}

impl SyncCohort {
    /// Fails with `CohortTooLarge` when `contacts` exceeds `ceiling`
    pub fn new(index: usize, contacts: Vec<Contact>, ceiling: usize) -> Result<Self> {
        if contacts.len() > ceiling {
            return Err(SyncError::CohortTooLarge {
                size: contacts.len(),
                ceiling,
            });
        }
        let identity_map = identity::identity_map(&contacts);
        Ok(Self {
            index,
            contacts,
            identity_map,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity_map
    }

    /// Emails used as de-dup lookup keys. Contacts without email never appear here.
    pub fn lookup_keys(&self) -> Vec<String> {
        self.identity_map.keys().cloned().collect()
    }

    /// De-dup read: look the cohort's emails up in the remote directory
    pub async fn read(self, directory: &dyn RemoteDirectory, token: &AccessToken) -> ReadCohort {
        if self.identity_map.is_empty() {
            debug!(
                "[SyncCohort] Cohort {} has no emails, skipping de-dup read",
                self.index
            );
            return ReadCohort::from_read(self, Ok(Vec::new()));
        }

        let request = BatchReadRequest::by_email(self.lookup_keys());
        let read = directory.batch_read(token, request).await.map(|response| {
            if response.has_errors() {
                // Unknown emails come back as per-record errors; that is the expected "not found"
                debug!(
                    "[SyncCohort] De-dup read for cohort {} reported {} unknown ids",
                    self.index,
                    response.errors.len()
                );
            }
            response.results
        });
        ReadCohort::from_read(self, read)
    }
}

#[derive(Debug)]
pub struct ReadCohort {
    cohort: SyncCohort,
    known: Vec<RemoteContactRecord>,
    read_error: Option<SyncError>,
}

impl ReadCohort {
    pub fn from_read(
        cohort: SyncCohort,
        read: std::result::Result<Vec<RemoteContactRecord>, RemoteError>,
    ) -> Self {
        match read {
            Ok(known) => Self {
                cohort,
                known,
                read_error: None,
            },
            Err(e) => {
                // Accepted risk: without the read result every cohort email is treated
                // as net-new, so a contact that already exists remotely may be re-created.
                warn!(
                    "[SyncCohort] De-dup read failed for cohort {}; continuing without de-dup, duplicate creation possible: {}",
                    cohort.index, e
                );
                Self {
                    cohort,
                    known: Vec::new(),
                    read_error: Some(SyncError::RemoteRead(e)),
                }
            }
        }
    }

    /// Records the remote directory already holds
    pub fn known(&self) -> &[RemoteContactRecord] {
        &self.known
    }

    pub fn read_failed(&self) -> bool {
        self.read_error.is_some()
    }

    /// Drop every email returned by the read from the identity map
    pub fn remove_known(self) -> NetNewCohort {
        let SyncCohort {
            index,
            contacts,
            mut identity_map,
        } = self.cohort;

        for email in self.known.iter().filter_map(|r| r.email()) {
            identity_map.remove(email);
        }

        NetNewCohort {
            index,
            contacts,
            net_new: identity_map,
            known: self.known,
            errors: self.read_error.into_iter().collect(),
        }
    }
}

#[derive(Debug)]
pub struct NetNewCohort {
    index: usize,
    contacts: Vec<Contact>,
    net_new: IdentityMap,
    known: Vec<RemoteContactRecord>,
    errors: Vec<SyncError>,
}

impl NetNewCohort {
    /// Emails still needing remote creation
    pub fn net_new(&self) -> &IdentityMap {
        &self.net_new
    }

    /// Creation payload for every contact left in the identity map, in cohort order
    pub fn creation_payload(&self) -> Vec<CreateContactInput> {
        self.contacts
            .iter()
            .filter(|c| {
                c.natural_key()
                    .is_some_and(|email| self.net_new.get(email) == Some(&c.id))
            })
            .map(identity::creation_payload)
            .collect()
    }

    /// Create the net-new contacts with one batch call (skipped when nothing is left)
    pub async fn create(self, directory: &dyn RemoteDirectory, token: &AccessToken) -> CreatedCohort {
        let payload = self.creation_payload();
        if payload.is_empty() {
            info!(
                "[SyncCohort] All contacts in cohort {} were known, no need to create",
                self.index
            );
            return self.into_created(None);
        }

        debug!(
            "[SyncCohort] Creating {} net-new contacts for cohort {}",
            payload.len(),
            self.index
        );
        let response = directory.batch_create(token, payload).await;
        self.into_created(Some(response))
    }

    /// Attach the outcome of the create step (or `None` when it was skipped)
    pub fn into_created(
        self,
        response: Option<std::result::Result<BatchResponse, RemoteError>>,
    ) -> CreatedCohort {
        let mut errors = self.errors;
        let created = match response {
            None => None,
            Some(Ok(output)) => {
                if output.has_errors() {
                    warn!(
                        "[SyncCohort] Batch create for cohort {} returned {} record errors",
                        self.index,
                        output.errors.len()
                    );
                    errors.push(SyncError::CreateRejected {
                        errors: output.errors.clone(),
                    });
                }
                Some(output)
            }
            Some(Err(e)) => {
                error!(
                    "[SyncCohort] Batch create failed for cohort {}: {}",
                    self.index, e
                );
                errors.push(SyncError::RemoteCreate(e));
                None
            }
        };

        CreatedCohort {
            index: self.index,
            known: self.known,
            created,
            errors,
        }
    }
}

#[derive(Debug)]
pub struct CreatedCohort {
    index: usize,
    known: Vec<RemoteContactRecord>,
    created: Option<BatchResponse>,
    errors: Vec<SyncError>,
}

impl CreatedCohort {
    pub fn created(&self) -> Option<&BatchResponse> {
        self.created.as_ref()
    }

    /// Records whose remote ids get written back: the created ones, then the known ones
    pub fn write_back_records(&self) -> impl Iterator<Item = &RemoteContactRecord> {
        self.created
            .iter()
            .flat_map(|output| output.results.iter())
            .chain(self.known.iter())
    }

    /// Persist remote ids onto local rows, joined by email
    ///
    /// A record without an email cannot be joined and yields a `WriteBack` error
    /// without touching any row; the remaining records are still written.
    pub async fn write_back(self, store: &dyn LocalStore) -> CohortReport {
        let mut linked = 0;
        let mut write_back_errors = Vec::new();

        for record in self.write_back_records() {
            let Some(email) = record.email() else {
                error!(
                    "[SyncCohort] Need an email address to save remote contact {} (cohort {})",
                    record.id, self.index
                );
                write_back_errors.push(SyncError::WriteBack {
                    remote_id: record.id.clone(),
                    reason: "record has no email to join on".to_string(),
                });
                continue;
            };

            match store.update_contact_remote_id(email, &record.id).await {
                Ok(_) => linked += 1,
                Err(e) => {
                    error!(
                        "[SyncCohort] Failed to save remote id {} for {}: {}",
                        record.id, email, e
                    );
                    write_back_errors.push(SyncError::WriteBack {
                        remote_id: record.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let index = self.index;
        let mut errors = self.errors;
        errors.extend(write_back_errors);

        CohortReport {
            index,
            known: self.known.len(),
            linked,
            success: self.created.map(|output| CohortSuccess {
                cohort: index,
                output,
            }),
            errors: errors.iter().map(|e| e.to_cohort_error(index)).collect(),
        }
    }
}

/// Outcome of one cohort, ready to be appended to the run aggregates
#[derive(Debug, Clone)]
pub struct CohortReport {
    pub index: usize,
    /// Records the de-dup read found remotely
    pub known: usize,
    /// Local rows that received a remote id
    pub linked: usize,
    /// Batch-create output, when a create call returned
    pub success: Option<CohortSuccess>,
    pub errors: Vec<CohortError>,
}

impl CohortReport {
    pub fn created(&self) -> usize {
        self.success.as_ref().map_or(0, |s| s.created_count())
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crmsync_api::{
        CohortErrorKind, ContactFilter, NewContact, RemoteRecordError, PROPERTY_EMAIL,
        PROPERTY_FIRST_NAME,
    };
    use chrono::Utc;
    use proptest::prelude::*;

    fn created_output(results: Vec<RemoteContactRecord>) -> BatchResponse {
        BatchResponse::complete(results, Utc::now())
    }

    fn contact(id: i64, email: Option<&str>) -> Contact {
        Contact {
            id,
            first_name: Some(format!("First{id}")),
            last_name: None,
            email: email.map(str::to_string),
            remote_id: None,
        }
    }

    fn remote(id: &str, email: Option<&str>) -> RemoteContactRecord {
        let record = RemoteContactRecord::new(id);
        match email {
            Some(email) => record.with_property(PROPERTY_EMAIL, email),
            None => record,
        }
    }

    fn cohort(contacts: Vec<Contact>) -> SyncCohort {
        SyncCohort::new(0, contacts, 100).unwrap()
    }

    #[test]
    fn test_ceiling_is_inclusive() {
        let exactly: Vec<_> = (0..100).map(|i| contact(i, None)).collect();
        assert!(SyncCohort::new(0, exactly, 100).is_ok());

        let too_many: Vec<_> = (0..101).map(|i| contact(i, None)).collect();
        let err = SyncCohort::new(0, too_many, 100).unwrap_err();
        assert!(matches!(
            err,
            SyncError::CohortTooLarge {
                size: 101,
                ceiling: 100
            }
        ));
    }

    #[test]
    fn test_contacts_without_email_are_not_lookup_keys() {
        let c = cohort(vec![contact(1, Some("a@x.com")), contact(2, None)]);
        assert_eq!(c.lookup_keys(), vec!["a@x.com".to_string()]);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_known_emails_are_removed_from_identity_map() {
        let c = cohort(vec![contact(1, Some("a@x.com")), contact(2, Some("b@x.com"))]);
        let net_new = ReadCohort::from_read(c, Ok(vec![remote("R1", Some("a@x.com"))])).remove_known();

        assert_eq!(net_new.net_new().len(), 1);
        assert!(net_new.net_new().contains_key("b@x.com"));
        let payload = net_new.creation_payload();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload[0].email(), Some("b@x.com"));
        assert_eq!(
            payload[0].properties.get(PROPERTY_FIRST_NAME).map(String::as_str),
            Some("First2")
        );
    }

    #[test]
    fn test_failed_read_keeps_identity_map_and_records_error() {
        let c = cohort(vec![contact(1, Some("a@x.com")), contact(2, Some("b@x.com"))]);
        let read = ReadCohort::from_read(c, Err(RemoteError::Transport("boom".into())));
        assert!(read.read_failed());

        let net_new = read.remove_known();
        assert_eq!(net_new.net_new().len(), 2);

        let created = net_new.into_created(None);
        assert_eq!(created.errors.len(), 1);
        assert!(matches!(created.errors[0], SyncError::RemoteRead(_)));
    }

    #[test]
    fn test_partial_create_errors_are_kept_with_output() {
        let c = cohort(vec![contact(1, Some("a@x.com"))]);
        let mut output = created_output(vec![]);
        output.errors.push(RemoteRecordError {
            status: "error".into(),
            category: "VALIDATION_ERROR".into(),
            message: "invalid email".into(),
            context: Default::default(),
        });

        let created = ReadCohort::from_read(c, Ok(vec![]))
            .remove_known()
            .into_created(Some(Ok(output)));

        assert!(created.created().is_some());
        assert!(matches!(
            &created.errors[0],
            SyncError::CreateRejected { errors } if errors.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_write_back_links_created_and_known_records() {
        let store = MemoryStore::new();
        let seeded = store
            .seed([NewContact::with_email("a@x.com"), NewContact::with_email("b@x.com")])
            .await
            .unwrap();

        let created = ReadCohort::from_read(cohort(seeded), Ok(vec![remote("R1", Some("a@x.com"))]))
            .remove_known()
            .into_created(Some(Ok(created_output(vec![remote("R2", Some("b@x.com"))]))));
        let report = created.write_back(&store).await;

        assert!(report.is_clean());
        assert_eq!(report.linked, 2);
        assert_eq!(report.created(), 1);
        assert_eq!(
            store.contact_by_email("a@x.com").await.unwrap().remote_id.as_deref(),
            Some("R1")
        );
        assert_eq!(
            store.contact_by_email("b@x.com").await.unwrap().remote_id.as_deref(),
            Some("R2")
        );
    }

    #[tokio::test]
    async fn test_write_back_without_email_updates_nothing() {
        let store = MemoryStore::new();
        let seeded = store.seed([NewContact::with_email("a@x.com")]).await.unwrap();

        let created = ReadCohort::from_read(cohort(seeded), Ok(vec![]))
            .remove_known()
            .into_created(Some(Ok(created_output(vec![remote("R7", None)]))));
        let report = created.write_back(&store).await;

        assert_eq!(report.linked, 0);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, CohortErrorKind::WriteBack);
        assert!(
            store
                .find_contacts(ContactFilter::Linked)
                .await
                .unwrap()
                .is_empty()
        );
    }

    proptest! {
        #[test]
        fn net_new_never_contains_known_emails(
            emails in proptest::collection::btree_set("[a-z]{1,6}@x\\.com", 0..40),
            known_mask in proptest::collection::vec(any::<bool>(), 40),
        ) {
            let emails: Vec<String> = emails.into_iter().collect();
            let contacts: Vec<Contact> = emails
                .iter()
                .enumerate()
                .map(|(i, e)| contact(i as i64, Some(e.as_str())))
                .collect();
            let known: Vec<RemoteContactRecord> = emails
                .iter()
                .zip(known_mask.iter())
                .filter(|(_, k)| **k)
                .map(|(e, _)| remote("R", Some(e.as_str())))
                .collect();

            let net_new = ReadCohort::from_read(cohort(contacts), Ok(known.clone())).remove_known();

            for record in &known {
                prop_assert!(!net_new.net_new().contains_key(record.email().unwrap()));
            }
            prop_assert_eq!(net_new.net_new().len() + known.len(), emails.len());
            prop_assert_eq!(net_new.creation_payload().len(), net_new.net_new().len());
        }
    }
}
