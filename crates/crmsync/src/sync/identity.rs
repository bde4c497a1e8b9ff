//! Projections between local rows and remote records, joined by email

use std::collections::BTreeMap;

use crmsync_api::{
    Contact, ContactId, ContactSyncRecord, CreateContactInput, InboundOutcome, NewContact,
    RemoteContactRecord, PROPERTY_EMAIL, PROPERTY_FIRST_NAME, PROPERTY_LAST_NAME,
};

/// email -> local identity, for contacts that carry an email
pub type IdentityMap = BTreeMap<String, ContactId>;

pub fn identity_map<'a>(contacts: impl IntoIterator<Item = &'a Contact>) -> IdentityMap {
    contacts
        .into_iter()
        .filter_map(|c| c.natural_key().map(|email| (email.to_string(), c.id)))
        .collect()
}

/// Remote creation payload: email, first and last name, non-empty values only
pub fn creation_payload(contact: &Contact) -> CreateContactInput {
    let mut properties = BTreeMap::new();
    let fields = [
        (PROPERTY_EMAIL, &contact.email),
        (PROPERTY_FIRST_NAME, &contact.first_name),
        (PROPERTY_LAST_NAME, &contact.last_name),
    ];
    for (name, value) in fields {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            properties.insert(name.to_string(), value.to_string());
        }
    }
    CreateContactInput { properties }
}

/// Full local row for a remote record, linked to it
pub fn new_contact_from_remote(record: &RemoteContactRecord) -> NewContact {
    NewContact {
        first_name: record.first_name().map(str::to_string),
        last_name: record.last_name().map(str::to_string),
        email: record.email().map(str::to_string),
        remote_id: Some(record.id.clone()),
    }
}

pub fn sync_record(
    record: &RemoteContactRecord,
    contact: Option<&Contact>,
    outcome: InboundOutcome,
    error: Option<String>,
) -> ContactSyncRecord {
    ContactSyncRecord {
        local_id: contact.map(|c| c.id),
        remote_id: record.id.clone(),
        email: record.email().map(str::to_string),
        first_name: record.first_name().map(str::to_string),
        last_name: record.last_name().map(str::to_string),
        outcome,
        error,
    }
}
