mod test_utils;

use std::sync::Arc;

use ads_sync::config::RefreshConfig;
use ads_sync::facebook::GraphOAuthClient;
use ads_sync::job_tracker::{SyncJobTracker, UserLocks};
use ads_sync::models::{InsightLevel, SyncJobStatus};
use ads_sync::repositories::{
    AdsRepository, CredentialRepository, OAuthSessionRepository, SyncJobRepository,
};
use ads_sync::scheduler::{RefreshScheduler, TickStats};
use ads_sync::sync_engine::SyncEngine;
use ads_sync::sync_service::SyncService;
use ads_sync::validator::CredentialValidator;
use ads_sync::{AdsError, InvalidReason};
use chrono::{Duration, Utc};
use sea_orm::DatabaseConnection;
use serde_json::json;
use test_utils::{
    ScriptedAdsApi, ScriptedApiFactory, app_config, create_credential, create_live_credential,
    day, graph_config, setup_test_db, test_crypto_key,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOOKBACK_DAYS: u32 = 7;

fn build_service(
    db: &DatabaseConnection,
    server: &MockServer,
    factory: ScriptedApiFactory,
) -> SyncService {
    let validator = CredentialValidator::new(
        CredentialRepository::new(db.clone()),
        GraphOAuthClient::new(app_config(&server.uri()), &graph_config(&server.uri(), 10)),
        test_crypto_key(),
    );
    SyncService::new(
        validator,
        Arc::new(factory),
        SyncEngine::new(AdsRepository::new(db.clone())),
        SyncJobTracker::new(SyncJobRepository::new(db.clone()), UserLocks::new()),
        LOOKBACK_DAYS,
    )
}

async fn mount_debug_token(server: &MockServer, token: &str, is_valid: bool) {
    Mock::given(method("GET"))
        .and(path("/v19.0/debug_token"))
        .and(query_param("input_token", token))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "is_valid": is_valid } })),
        )
        .mount(server)
        .await;
}

fn scripted_factory() -> ScriptedApiFactory {
    ScriptedApiFactory::new(ScriptedAdsApi::new().with_standard_account("act_1"))
}

#[tokio::test]
async fn invalid_credential_creates_no_job() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    let factory = scripted_factory();
    let service = build_service(&db, &server, factory.clone());

    let err = service.manual_refresh("nobody", None).await.unwrap_err();
    assert_eq!(err.invalid_reason(), Some(InvalidReason::Missing));

    create_credential(&db, "user_1", "user-token", Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    let err = service.manual_refresh("user_1", None).await.unwrap_err();
    assert!(matches!(
        err,
        AdsError::CredentialInvalid {
            reason: InvalidReason::Expired
        }
    ));

    let jobs = SyncJobRepository::new(db.clone())
        .list_by_user("user_1", 10)
        .await
        .unwrap();
    assert!(jobs.is_empty());
    assert!(factory.tokens().is_empty());
}

#[tokio::test]
async fn manual_refresh_runs_tracked_sync() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_debug_token(&server, "user-token", true).await;
    create_live_credential(&db, "user_1").await.unwrap();
    let factory = scripted_factory();
    let service = build_service(&db, &server, factory.clone());

    let run = service
        .manual_refresh("user_1", Some(day(0)))
        .await
        .unwrap();

    assert_eq!(run.output.insights, 15);
    assert_eq!(factory.tokens(), vec!["user-token".to_string()]);
    assert!(
        factory
            .api
            .insight_calls()
            .iter()
            .all(|(_, _, since)| *since == Some(day(0)))
    );

    let job = SyncJobRepository::new(db.clone())
        .find(run.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.job_status(), Some(SyncJobStatus::Success));

    let account = AdsRepository::new(db.clone())
        .find_account("act_1")
        .await
        .unwrap()
        .unwrap();
    assert!(account.initial_sync_completed_at.is_none());
}

#[tokio::test]
async fn initialize_workspace_pulls_full_history() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_debug_token(&server, "user-token", true).await;
    create_live_credential(&db, "user_1").await.unwrap();
    let factory = scripted_factory();
    let service = build_service(&db, &server, factory.clone());

    service.initialize_workspace("user_1").await.unwrap();

    let calls = factory.api.insight_calls();
    assert_eq!(calls.len(), InsightLevel::ALL.len());
    assert!(calls.iter().all(|(_, _, since)| since.is_none()));

    let account = AdsRepository::new(db.clone())
        .find_account("act_1")
        .await
        .unwrap()
        .unwrap();
    assert!(account.initial_sync_completed_at.is_some());
}

#[tokio::test]
async fn scheduled_refresh_uses_lookback_window() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_debug_token(&server, "user-token", true).await;
    create_live_credential(&db, "user_1").await.unwrap();
    let factory = scripted_factory();
    let service = build_service(&db, &server, factory.clone());

    service.scheduled_refresh("user_1").await.unwrap();

    let expected = Utc::now().date_naive() - Duration::days(i64::from(LOOKBACK_DAYS));
    assert!(
        factory
            .api
            .insight_calls()
            .iter()
            .all(|(_, _, since)| *since == Some(expected))
    );
}

#[tokio::test]
async fn scheduler_tick_refreshes_eligible_credentials() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_debug_token(&server, "user-token", true).await;
    mount_debug_token(&server, "revoked-token", false).await;

    create_live_credential(&db, "healthy").await.unwrap();
    create_credential(&db, "revoked", "revoked-token", Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    create_credential(&db, "expired", "user-token", Utc::now() - Duration::hours(1))
        .await
        .unwrap();

    let sessions = OAuthSessionRepository::new(db.clone());
    sessions
        .create("healthy", "stale-state", Some("verifier".to_string()), 0)
        .await
        .unwrap();

    let credentials = CredentialRepository::new(db.clone());
    let scheduler = RefreshScheduler::new(
        RefreshConfig {
            jitter_factor: 0.0,
            ..RefreshConfig::default()
        },
        credentials.clone(),
        sessions,
        build_service(&db, &server, scripted_factory()),
    );

    let stats = scheduler.tick().await.unwrap();

    assert_eq!(
        stats,
        TickStats {
            eligible: 2,
            succeeded: 1,
            failed: 1,
            sessions_purged: 1,
            requiring_reauth: 2,
        }
    );

    let revoked = credentials.find_by_user("revoked").await.unwrap().unwrap();
    assert!(revoked.requires_reauth);

    let jobs = SyncJobRepository::new(db.clone());
    assert_eq!(jobs.list_by_user("healthy", 10).await.unwrap().len(), 1);
    assert!(jobs.list_by_user("revoked", 10).await.unwrap().is_empty());

    // Flagged credentials drop out of the next tick
    let next = scheduler.tick().await.unwrap();
    assert_eq!(next.eligible, 1);
    assert_eq!(next.succeeded, 1);
}
