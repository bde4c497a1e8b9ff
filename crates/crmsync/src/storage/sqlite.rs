//! SQLite-backed local store
//!
//! Holds the `contacts`, `sync_jobs` and `authorization` tables. A single
//! connection is shared behind an async mutex; every trait call takes the lock
//! for the duration of its statements, so calls from one sync run are serialized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crmsync_api::{
    Contact, ContactFilter, ContactPatch, Credentials, JobId, NewContact, SyncJob, Upserted,
};

use super::store::{CredentialStore, LocalStore};
use super::types::{Result, StoreError};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS contacts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name TEXT,
        last_name TEXT,
        email TEXT UNIQUE,
        remote_id TEXT
    );
    CREATE INDEX IF NOT EXISTS contacts_remote_id ON contacts (remote_id);

    CREATE TABLE IF NOT EXISTS sync_jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        execution_time TEXT NOT NULL,
        success TEXT,
        failures TEXT,
        completed_at TEXT
    );

    CREATE TABLE IF NOT EXISTS authorization (
        customer_id TEXT PRIMARY KEY,
        access_token TEXT NOT NULL,
        refresh_token TEXT NOT NULL,
        expires_in INTEGER NOT NULL,
        expires_at TEXT NOT NULL,
        remote_portal_id TEXT
    );
"#;

const CONTACT_COLUMNS: &str = "id, first_name, last_name, email, remote_id";
const JOB_COLUMNS: &str = "id, execution_time, success, failures, completed_at";

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Map a failed write, turning SQLite's constraint failures into the typed variant
fn write_error(e: rusqlite::Error, field: &str, value: &str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::ConstraintViolation {
                field: field.to_string(),
                value: value.to_string(),
            }
        }
        _ => StoreError::Database(e.to_string()),
    }
}

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        remote_id: row.get(4)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<SyncJob> {
    Ok(SyncJob {
        id: row.get(0)?,
        execution_time: row.get(1)?,
        success: row.get(2)?,
        failures: row.get(3)?,
        completed_at: row.get(4)?,
    })
}

fn contact_by_id(conn: &Connection, id: i64) -> Result<Contact> {
    conn.query_row(
        &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
        params![id],
        contact_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("contacts", id.to_string()))
}

fn contact_by_email(conn: &Connection, email: &str) -> Result<Option<Contact>> {
    Ok(conn
        .query_row(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE email = ?1"),
            params![email],
            contact_from_row,
        )
        .optional()?)
}

fn insert_contact(conn: &Connection, fields: &NewContact) -> Result<Contact> {
    conn.execute(
        "INSERT INTO contacts (first_name, last_name, email, remote_id) VALUES (?1, ?2, ?3, ?4)",
        params![
            fields.first_name,
            fields.last_name,
            fields.email,
            fields.remote_id
        ],
    )
    .map_err(|e| write_error(e, "email", fields.email.as_deref().unwrap_or_default()))?;
    contact_by_id(conn, conn.last_insert_rowid())
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!("[SqliteStore] Opened database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        debug!("[SqliteStore] Schema initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn find_contacts(&self, filter: ContactFilter) -> Result<Vec<Contact>> {
        let (clause, param) = match &filter {
            ContactFilter::All => ("", None),
            ContactFilter::Unlinked => ("WHERE remote_id IS NULL", None),
            ContactFilter::Linked => ("WHERE remote_id IS NOT NULL", None),
            ContactFilter::Email(email) => ("WHERE email = ?1", Some(email.as_str())),
            ContactFilter::RemoteId(id) => ("WHERE remote_id = ?1", Some(id.as_str())),
        };
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts {clause} ORDER BY id");

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let contacts = match param {
            Some(value) => stmt
                .query_map(params![value], contact_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], contact_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        debug!(
            "[SqliteStore] find_contacts({:?}) returned {} rows",
            filter,
            contacts.len()
        );
        Ok(contacts)
    }

    async fn upsert_contact_by_email(
        &self,
        email: &str,
        create: NewContact,
        update: ContactPatch,
    ) -> Result<Upserted> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let upserted = match contact_by_email(&tx, email)? {
            Some(existing) => {
                tx.execute(
                    "UPDATE contacts SET
                        first_name = COALESCE(?2, first_name),
                        last_name = COALESCE(?3, last_name),
                        remote_id = COALESCE(?4, remote_id)
                     WHERE id = ?1",
                    params![
                        existing.id,
                        update.first_name,
                        update.last_name,
                        update.remote_id
                    ],
                )?;
                Upserted::Updated(contact_by_id(&tx, existing.id)?)
            }
            None => {
                let fields = NewContact {
                    email: Some(email.to_string()),
                    ..create
                };
                Upserted::Created(insert_contact(&tx, &fields)?)
            }
        };

        tx.commit()?;
        Ok(upserted)
    }

    async fn create_contact(&self, fields: NewContact) -> Result<Contact> {
        let conn = self.conn.lock().await;
        insert_contact(&conn, &fields)
    }

    async fn update_contact_remote_id(&self, email: &str, remote_id: &str) -> Result<Contact> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE contacts SET remote_id = ?2 WHERE email = ?1",
            params![email, remote_id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("contacts", email));
        }
        contact_by_email(&conn, email)?.ok_or_else(|| StoreError::not_found("contacts", email))
    }

    async fn create_sync_job(&self, execution_time: DateTime<Utc>) -> Result<JobId> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sync_jobs (execution_time) VALUES (?1)",
            params![execution_time],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn complete_sync_job(
        &self,
        job_id: JobId,
        success: String,
        failures: String,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE sync_jobs SET success = ?2, failures = ?3, completed_at = ?4
             WHERE id = ?1 AND completed_at IS NULL",
            params![job_id, success, failures, completed_at],
        )?;
        if changed == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sync_jobs WHERE id = ?1)",
                params![job_id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                StoreError::already_completed(job_id)
            } else {
                StoreError::not_found("sync_jobs", job_id.to_string())
            });
        }
        Ok(())
    }

    async fn get_sync_job(&self, job_id: JobId) -> Result<Option<SyncJob>> {
        let conn = self.conn.lock().await;
        Ok(conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?1"),
                params![job_id],
                job_from_row,
            )
            .optional()?)
    }

    async fn list_sync_jobs(&self, limit: usize) -> Result<Vec<SyncJob>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs ORDER BY id DESC LIMIT ?1"
        ))?;
        let jobs = stmt
            .query_map(params![limit as i64], job_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn load_credentials(&self, customer_id: &str) -> Result<Option<Credentials>> {
        let conn = self.conn.lock().await;
        let credentials = conn
            .query_row(
                "SELECT customer_id, access_token, refresh_token, expires_in, expires_at, remote_portal_id
                 FROM authorization WHERE customer_id = ?1",
                params![customer_id],
                |row| {
                    Ok(Credentials {
                        customer_id: row.get(0)?,
                        access_token: row.get(1)?,
                        refresh_token: row.get(2)?,
                        expires_in: row.get(3)?,
                        expires_at: row.get(4)?,
                        remote_portal_id: row.get(5)?,
                    })
                },
            )
            .optional()?;
        debug!(
            "[SqliteStore] Loaded credentials for customer '{}': present={}",
            customer_id,
            credentials.is_some()
        );
        Ok(credentials)
    }

    async fn save_credentials(&self, credentials: &Credentials) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO authorization
                (customer_id, access_token, refresh_token, expires_in, expires_at, remote_portal_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(customer_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_in = excluded.expires_in,
                expires_at = excluded.expires_at,
                remote_portal_id = excluded.remote_portal_id
            "#,
            params![
                credentials.customer_id,
                credentials.access_token,
                credentials.refresh_token,
                credentials.expires_in,
                credentials.expires_at,
                credentials.remote_portal_id
            ],
        )?;
        info!(
            "[SqliteStore] Saved credentials for customer '{}'",
            credentials.customer_id
        );
        Ok(())
    }
}
