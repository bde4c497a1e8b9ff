use crate::SyncWorld;
use crmsync::storage::LocalStore;
use crmsync::testing::StaticCredentialProvider;
use crmsync::{InboundSync, OutboundReconciler, SyncConfig};
use crmsync_api::{
    ContactFilter, InboundOutcome, NewContact, RemoteContactRecord, PROPERTY_EMAIL,
    PROPERTY_FIRST_NAME,
};
use cucumber::{given, then, when};
use std::sync::Arc;

fn config() -> SyncConfig {
    SyncConfig {
        customer_id: "customer-1".to_string(),
        ..SyncConfig::default()
    }
}

async fn run_outbound(world: &mut SyncWorld) {
    let reconciler = OutboundReconciler::new(
        world.store.clone(),
        world.directory.clone(),
        Arc::new(StaticCredentialProvider::new("token")),
        &config(),
    );
    let report = reconciler
        .run_outbound_sync()
        .await
        .expect("outbound sync failed");
    world.outbound = Some(report);
}

async fn run_inbound(world: &mut SyncWorld) {
    let engine = InboundSync::new(
        world.store.clone(),
        world.directory.clone(),
        Arc::new(StaticCredentialProvider::new("token")),
        &config(),
    );
    let report = engine.run_inbound_sync().await.expect("inbound sync failed");
    world.inbound = Some(report);
}

#[given(regex = r#"^a local contact "([^"]+)" without a remote id$"#)]
async fn local_contact(world: &mut SyncWorld, email: String) {
    world
        .store
        .seed([NewContact::with_email(email)])
        .await
        .expect("seeding failed");
}

#[given(regex = r#"^the remote directory has contact "([^"]+)" with email "([^"]+)"$"#)]
async fn remote_contact(world: &mut SyncWorld, id: String, email: String) {
    world
        .directory
        .insert(RemoteContactRecord::new(id).with_property(PROPERTY_EMAIL, email));
}

#[given(
    regex = r#"^the remote directory has contact "([^"]+)" with email "([^"]+)" and first name "([^"]+)"$"#
)]
async fn remote_contact_with_name(world: &mut SyncWorld, id: String, email: String, first: String) {
    world.directory.insert(
        RemoteContactRecord::new(id)
            .with_property(PROPERTY_EMAIL, email)
            .with_property(PROPERTY_FIRST_NAME, first),
    );
}

#[when("I run the outbound sync")]
async fn outbound_sync(world: &mut SyncWorld) {
    run_outbound(world).await;
}

#[when("I run the outbound sync again")]
async fn outbound_sync_again(world: &mut SyncWorld) {
    run_outbound(world).await;
}

#[when("I run the inbound sync")]
async fn inbound_sync(world: &mut SyncWorld) {
    run_inbound(world).await;
}

#[when("I run the inbound sync again")]
async fn inbound_sync_again(world: &mut SyncWorld) {
    run_inbound(world).await;
}

#[then(regex = r"^the remote directory received (\d+) create calls?$")]
async fn create_calls(world: &mut SyncWorld, count: usize) {
    assert_eq!(world.directory.create_calls(), count);
}

#[then(regex = r#"^the remote directory created only "([^"]+)"$"#)]
async fn created_only(world: &mut SyncWorld, email: String) {
    assert_eq!(world.directory.created_emails(), vec![email]);
}

#[then(regex = r"^the success aggregate has (\d+) cohorts? with (\d+) created records?$")]
async fn success_aggregate(world: &mut SyncWorld, cohorts: usize, created: usize) {
    let report = world.outbound.as_ref().expect("no outbound run");
    assert_eq!(report.success.len(), cohorts);
    let total: usize = report.success.iter().map(|s| s.created_count()).sum();
    assert_eq!(total, created);
}

#[then("the error aggregate is empty")]
async fn error_aggregate_empty(world: &mut SyncWorld) {
    let report = world.outbound.as_ref().expect("no outbound run");
    assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
}

#[then("the last run's success aggregate is empty")]
async fn last_success_empty(world: &mut SyncWorld) {
    let report = world.outbound.as_ref().expect("no outbound run");
    assert_eq!(report.backlog, 0);
    assert!(report.success.is_empty());
}

#[then("every local contact has a remote id")]
async fn all_linked(world: &mut SyncWorld) {
    let unlinked = world
        .store
        .find_contacts(ContactFilter::Unlinked)
        .await
        .expect("query failed");
    assert!(unlinked.is_empty(), "still unlinked: {unlinked:?}");
}

#[then(regex = r#"^local contact "([^"]+)" has remote id "([^"]+)"$"#)]
async fn has_remote_id(world: &mut SyncWorld, email: String, remote_id: String) {
    let contact = world
        .store
        .contact_by_email(&email)
        .await
        .expect("contact missing");
    assert_eq!(contact.remote_id.as_deref(), Some(remote_id.as_str()));
}

#[then(regex = r#"^local contact "([^"]+)" has the remote id of the created record$"#)]
async fn has_created_remote_id(world: &mut SyncWorld, email: String) {
    let remote = world
        .directory
        .record_by_email(&email)
        .expect("record was not created remotely");
    let contact = world
        .store
        .contact_by_email(&email)
        .await
        .expect("contact missing");
    assert_eq!(contact.remote_id, Some(remote.id));
}

#[then(regex = r#"^local contact "([^"]+)" has first name "([^"]+)"$"#)]
async fn has_first_name(world: &mut SyncWorld, email: String, first: String) {
    let contact = world
        .store
        .contact_by_email(&email)
        .await
        .expect("contact missing");
    assert_eq!(contact.first_name, Some(first));
}

#[then(regex = r"^the local store has (\d+) contacts?$")]
async fn contact_count(world: &mut SyncWorld, count: usize) {
    assert_eq!(world.store.contact_count().await, count);
}

#[then(regex = r#"^the inbound tally has (\d+) "([^"]+)" records?$"#)]
async fn inbound_tally(world: &mut SyncWorld, count: usize, category: String) {
    let report = world.inbound.as_ref().expect("no inbound run");
    let outcome = InboundOutcome::ALL
        .into_iter()
        .find(|o| o.as_str() == category)
        .expect("unknown outcome category");
    assert_eq!(report.results.count(outcome), count);
}
