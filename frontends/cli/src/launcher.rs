use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::args::{CliArgs, Command};
use crate::config::AppConfig;
use crmsync::auth::{CredentialProvider, OAuthCredentialProvider};
use crmsync::storage::{CredentialStore, LocalStore, SqliteStore};
use crmsync::{InboundSync, OutboundReconciler, SyncJobLedger};
use crmsync_api::ContactFilter;
use crmsync_hubspot::{HubSpotClient, HubSpotConfig, HubSpotOAuth, HubSpotTransport};

/// Everything a command may need, built once per process
struct Services {
    config: AppConfig,
    store: Arc<SqliteStore>,
    directory: Arc<HubSpotClient>,
    credentials: Arc<OAuthCredentialProvider>,
}

impl Services {
    fn build(config: AppConfig) -> Result<Self> {
        config.sync.validate()?;
        config.hubspot.validate()?;

        let store = Arc::new(
            SqliteStore::open(&config.sync.database_path).with_context(|| {
                format!(
                    "Failed to open database {}",
                    config.sync.database_path.display()
                )
            })?,
        );
        let transport = Arc::new(HubSpotTransport::new(&config.hubspot)?);
        let directory = Arc::new(HubSpotClient::new(transport.clone()));
        let exchanger = Arc::new(HubSpotOAuth::new(transport, &config.hubspot));
        let credentials = Arc::new(OAuthCredentialProvider::new(store.clone(), exchanger));

        Ok(Self {
            config,
            store,
            directory,
            credentials,
        })
    }

    fn inbound(&self) -> InboundSync {
        InboundSync::new(
            self.store.clone(),
            self.directory.clone(),
            self.credentials.clone(),
            &self.config.sync,
        )
    }

    fn outbound(&self) -> OutboundReconciler {
        OutboundReconciler::new(
            self.store.clone(),
            self.directory.clone(),
            self.credentials.clone(),
            &self.config.sync,
        )
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_install_url(hubspot: &HubSpotConfig) -> Result<()> {
    hubspot.validate()?;
    println!("{}", hubspot.authorization_url()?);
    Ok(())
}

pub async fn run(args: CliArgs) -> Result<()> {
    let config = AppConfig::load(args.config_path.as_deref(), args.db_path, |key| {
        std::env::var(key).ok()
    })?;

    // Needs only the client settings, not a database or customer
    if args.command == Command::InstallUrl {
        return print_install_url(&config.hubspot);
    }

    let services = Services::build(config)?;
    let customer_id = services.config.sync.customer_id.clone();
    info!("[crmsync] Running {:?} for customer '{}'", args.command, customer_id);

    match args.command {
        Command::Inbound => {
            let report = services.inbound().run_inbound_sync().await?;
            print_json(&report)
        }
        Command::Outbound => {
            let report = services.outbound().run_outbound_sync().await?;
            print_json(&report)
        }
        Command::Contacts { unlinked_only } => {
            let filter = if unlinked_only {
                ContactFilter::Unlinked
            } else {
                ContactFilter::All
            };
            let contacts = services.store.find_contacts(filter).await?;
            print_json(&contacts)
        }
        Command::Jobs { limit } => {
            let ledger = SyncJobLedger::new(services.store.clone());
            let jobs = ledger.recent(limit).await?;
            print_json(&jobs)
        }
        Command::Redeem { code } => {
            let creds = services.credentials.redeem_code(&customer_id, &code).await?;
            print_json(&json!({
                "customerId": creds.customer_id,
                "portalId": creds.remote_portal_id,
                "expiresAt": creds.expires_at,
            }))
        }
        Command::Token => {
            services.credentials.access_token(&customer_id).await?;
            let creds = services
                .store
                .load_credentials(&customer_id)
                .await?
                .with_context(|| format!("No credentials stored for customer '{customer_id}'"))?;
            print_json(&json!({
                "customerId": creds.customer_id,
                "portalId": creds.remote_portal_id,
                "expiresAt": creds.expires_at,
            }))
        }
        Command::InstallUrl => print_install_url(&services.config.hubspot),
    }
}
