//! Both sync directions against a file-backed SQLite store

use anyhow::Result;
use crmsync::storage::{LocalStore, SqliteStore};
use crmsync::testing::{FakeRemoteDirectory, StaticCredentialProvider};
use crmsync::{InboundSync, OutboundReconciler, SyncConfig, SyncJobLedger};
use crmsync_api::{ContactFilter, NewContact, RemoteContactRecord, PROPERTY_EMAIL};
use std::sync::Arc;
use tempfile::TempDir;

fn config() -> SyncConfig {
    SyncConfig {
        customer_id: "customer-1".to_string(),
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn test_round_trip_through_sqlite_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("crmsync.db");
    let directory = Arc::new(FakeRemoteDirectory::new());
    directory.insert(RemoteContactRecord::new("R1").with_property(PROPERTY_EMAIL, "a@x.com"));

    {
        let store = Arc::new(SqliteStore::open(&path)?);
        store.create_contact(NewContact::with_email("a@x.com")).await?;
        store.create_contact(NewContact::with_email("b@x.com")).await?;

        let reconciler = OutboundReconciler::new(
            store.clone(),
            directory.clone(),
            Arc::new(StaticCredentialProvider::new("token")),
            &config(),
        );
        let report = reconciler.run_outbound_sync().await?;
        assert_eq!(report.success.len(), 1);
        assert_eq!(report.success[0].created_count(), 1);
    }

    // Reopen: links and the ledger row survive
    let store = Arc::new(SqliteStore::open(&path)?);
    let linked = store.find_contacts(ContactFilter::Linked).await?;
    assert_eq!(linked.len(), 2);
    let a = store
        .find_contacts(ContactFilter::Email("a@x.com".to_string()))
        .await?;
    assert_eq!(a[0].remote_id.as_deref(), Some("R1"));

    let ledger = SyncJobLedger::new(store.clone());
    let jobs = ledger.recent(10).await?;
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].is_completed());

    // Pulling the same data back changes nothing
    let inbound = InboundSync::new(
        store.clone(),
        directory.clone(),
        Arc::new(StaticCredentialProvider::new("token")),
        &config(),
    );
    let report = inbound.run_inbound_sync().await?;
    assert_eq!(report.total, 2);
    assert_eq!(store.find_contacts(ContactFilter::All).await?.len(), 2);
    Ok(())
}
