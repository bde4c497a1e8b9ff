use serde::{Deserialize, Serialize};

/// Local identity assigned by the store
pub type ContactId = i64;

/// A row of the local `contacts` table
///
/// `email` is the natural key shared with the remote directory: when present it is
/// unique across all rows. `remote_id` is `None` until the row has been linked to
/// its remote counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub remote_id: Option<String>,
}

impl Contact {
    pub fn is_linked(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Email if present and non-empty
    pub fn natural_key(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.is_empty())
    }
}

/// Fields for a row that does not exist yet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub remote_id: Option<String>,
}

impl NewContact {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    pub fn remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }
}

/// Partial update of an existing row. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub remote_id: Option<String>,
}

impl ContactPatch {
    /// Patch that only attaches (or overwrites) the remote identifier
    pub fn link(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.remote_id.is_none()
    }
}

/// Selection used by `findContacts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactFilter {
    All,
    /// `remote_id IS NULL`
    Unlinked,
    /// `remote_id IS NOT NULL`
    Linked,
    Email(String),
    RemoteId(String),
}

impl ContactFilter {
    pub fn matches(&self, contact: &Contact) -> bool {
        match self {
            ContactFilter::All => true,
            ContactFilter::Unlinked => !contact.is_linked(),
            ContactFilter::Linked => contact.is_linked(),
            ContactFilter::Email(email) => contact.email.as_deref() == Some(email.as_str()),
            ContactFilter::RemoteId(id) => contact.remote_id.as_deref() == Some(id.as_str()),
        }
    }
}

/// Result of an upsert keyed by email
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted {
    Created(Contact),
    Updated(Contact),
}

impl Upserted {
    pub fn contact(&self) -> &Contact {
        match self {
            Upserted::Created(c) | Upserted::Updated(c) => c,
        }
    }

    pub fn into_contact(self) -> Contact {
        match self {
            Upserted::Created(c) | Upserted::Updated(c) => c,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Upserted::Created(_))
    }
}
