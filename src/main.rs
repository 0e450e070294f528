//! # Ads Sync CLI
//!
//! Operator entry point: run migrations, drive the OAuth legs, validate a
//! credential, trigger syncs, or run the refresh scheduler.

use std::sync::Arc;

use ads_sync::{
    config::{AppConfig, ConfigLoader},
    db::{init_pool, run_migrations},
    facebook::{AdsApiFactory, GraphAdsClientFactory, GraphOAuthClient},
    job_tracker::{SyncJobTracker, UserLocks},
    oauth::OAuthFlow,
    repositories::{AdsRepository, CredentialRepository, OAuthSessionRepository, SyncJobRepository},
    scheduler::RefreshScheduler,
    sync_engine::SyncEngine,
    sync_service::SyncService,
    telemetry::init_tracing,
    validator::{CredentialValidator, ValidationOutcome},
};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "ads-sync", version, about = "Facebook Ads credential and sync service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Start an authorization flow and print the consent URL
    AuthorizeUrl {
        #[arg(long)]
        user: String,
    },
    /// Complete an authorization flow with the provider's redirect parameters
    Callback {
        #[arg(long)]
        user: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        state: String,
    },
    /// Validate a user's stored credential against the provider
    Validate {
        #[arg(long)]
        user: String,
    },
    /// Run a tracked manual refresh
    Refresh {
        #[arg(long)]
        user: String,
        /// First insight day to pull (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,
    },
    /// Run the initial full sync for a user's workspace
    InitWorkspace {
        #[arg(long)]
        user: String,
    },
    /// Run the periodic refresh loop until Ctrl-C
    Scheduler,
}

/// Everything the subcommands need, wired from one config and pool.
struct Services {
    oauth_flow: OAuthFlow,
    validator: CredentialValidator,
    sync: SyncService,
    scheduler: RefreshScheduler,
}

impl Services {
    fn build(config: &AppConfig, db: DatabaseConnection) -> Result<Self> {
        let crypto_key = config.crypto_key()?;
        let graph = config.graph_api_config();
        let app = config.facebook_app()?;

        let credentials = CredentialRepository::new(db.clone());
        let sessions = OAuthSessionRepository::new(db.clone());
        let ads = AdsRepository::with_chunk_size(db.clone(), config.sync.upsert_chunk_size);
        let jobs = SyncJobRepository::new(db);

        let oauth_client = GraphOAuthClient::new(app, &graph);
        let api_factory: Arc<dyn AdsApiFactory> = Arc::new(GraphAdsClientFactory::new(graph));
        let engine = SyncEngine::new(ads.clone());
        let tracker = SyncJobTracker::new(jobs, UserLocks::new());
        let validator =
            CredentialValidator::new(credentials.clone(), oauth_client.clone(), crypto_key.clone());

        let sync = SyncService::new(
            validator.clone(),
            api_factory.clone(),
            engine.clone(),
            tracker.clone(),
            config.refresh.lookback_days,
        );
        let oauth_flow = OAuthFlow::new(
            oauth_client,
            api_factory,
            sessions.clone(),
            credentials.clone(),
            ads,
            engine,
            tracker,
            crypto_key,
        );
        let scheduler = RefreshScheduler::new(config.refresh.clone(), credentials, sessions, sync.clone());

        Ok(Self {
            oauth_flow,
            validator,
            sync,
            scheduler,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;
    init_tracing(&config)?;
    info!(profile = %config.profile, "Loaded configuration");

    let db = init_pool(&config).await?;

    if let Command::Migrate = cli.command {
        run_migrations(&db).await?;
        return Ok(());
    }

    let services = Services::build(&config, db)?;

    match cli.command {
        Command::Migrate => {}
        Command::AuthorizeUrl { user } => {
            let request = services.oauth_flow.initiate(&user).await?;
            print_json(json!({
                "url": request.url.as_str(),
                "state": request.state,
                "expiresAt": request.expires_at.to_rfc3339(),
            }))?;
        }
        Command::Callback { user, code, state } => {
            let connected = services.oauth_flow.complete(&user, &code, &state).await?;
            print_json(json!({
                "credentialId": connected.credential.id,
                "accountIds": connected.credential.account_id_list(),
                "syncJobId": connected.sync_job_id,
                "synced": connected.synced,
            }))?;
        }
        Command::Validate { user } => {
            let body = match services.validator.validate(&user).await? {
                ValidationOutcome::Valid(token) => json!({
                    "valid": true,
                    "credentialId": token.credential_id,
                }),
                ValidationOutcome::Invalid(reason) => json!({
                    "valid": false,
                    "reason": reason,
                }),
            };
            print_json(body)?;
        }
        Command::Refresh { user, since } => {
            let run = services.sync.manual_refresh(&user, since).await?;
            print_json(json!({ "jobId": run.job_id, "synced": run.output }))?;
        }
        Command::InitWorkspace { user } => {
            let run = services.sync.initialize_workspace(&user).await?;
            print_json(json!({ "jobId": run.job_id, "synced": run.output }))?;
        }
        Command::Scheduler => {
            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                }
                signal_token.cancel();
            });
            services.scheduler.run(shutdown).await;
        }
    }

    Ok(())
}

fn print_json(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
