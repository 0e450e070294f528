mod test_utils;

use ads_sync::facebook::GraphOAuthClient;
use ads_sync::repositories::CredentialRepository;
use ads_sync::validator::{CredentialValidator, ValidationOutcome};
use ads_sync::{AdsError, InvalidReason};
use chrono::{Duration, Utc};
use sea_orm::DatabaseConnection;
use serde_json::json;
use test_utils::{
    app_config, create_credential, create_live_credential, graph_config, setup_test_db,
    test_crypto_key,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: &str = "user_1";

fn validator(db: &DatabaseConnection, server: &MockServer) -> CredentialValidator {
    CredentialValidator::new(
        CredentialRepository::new(db.clone()),
        GraphOAuthClient::new(app_config(&server.uri()), &graph_config(&server.uri(), 10)),
        test_crypto_key(),
    )
}

async fn mount_debug_token(server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v19.0/debug_token"))
        .and(query_param("input_token", "user-token"))
        .and(query_param("access_token", "test-app|test-secret"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

async fn requires_reauth(db: &DatabaseConnection) -> bool {
    CredentialRepository::new(db.clone())
        .find_by_user(USER)
        .await
        .unwrap()
        .expect("credential exists")
        .requires_reauth
}

#[tokio::test]
async fn missing_credential_is_reported() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;

    let outcome = validator(&db, &server).validate(USER).await.unwrap();
    assert_eq!(outcome, ValidationOutcome::Invalid(InvalidReason::Missing));

    let err = validator(&db, &server)
        .ensure_valid_token(USER)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdsError::CredentialInvalid {
            reason: InvalidReason::Missing
        }
    ));
}

#[tokio::test]
async fn expired_credential_is_flagged_without_remote_call() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v19.0/debug_token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    create_credential(&db, USER, "user-token", Utc::now() - Duration::minutes(5))
        .await
        .unwrap();

    let outcome = validator(&db, &server).validate(USER).await.unwrap();

    assert_eq!(outcome, ValidationOutcome::Invalid(InvalidReason::Expired));
    assert!(requires_reauth(&db).await);
}

#[tokio::test]
async fn flagged_credential_is_revoked() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    let credential = create_live_credential(&db, USER).await.unwrap();
    CredentialRepository::new(db.clone())
        .mark_requires_reauth(credential.id)
        .await
        .unwrap();

    let outcome = validator(&db, &server).validate(USER).await.unwrap();
    assert_eq!(outcome, ValidationOutcome::Invalid(InvalidReason::Revoked));
}

#[tokio::test]
async fn provider_rejection_is_unauthorized() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_debug_token(&server, 200, json!({ "data": { "is_valid": false } })).await;
    create_live_credential(&db, USER).await.unwrap();

    let outcome = validator(&db, &server).validate(USER).await.unwrap();

    assert_eq!(
        outcome,
        ValidationOutcome::Invalid(InvalidReason::Unauthorized)
    );
    assert!(requires_reauth(&db).await);
}

#[tokio::test]
async fn introspection_failure_is_unknown() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_debug_token(
        &server,
        500,
        json!({ "error": { "message": "An unexpected error has occurred." } }),
    )
    .await;
    create_live_credential(&db, USER).await.unwrap();

    let outcome = validator(&db, &server).validate(USER).await.unwrap();

    assert_eq!(outcome, ValidationOutcome::Invalid(InvalidReason::Unknown));
    assert!(requires_reauth(&db).await);
}

#[tokio::test]
async fn valid_token_refreshes_expiry_and_validation_time() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    let revised = Utc::now() + Duration::days(30);
    mount_debug_token(
        &server,
        200,
        json!({
            "data": {
                "is_valid": true,
                "expires_at": revised.timestamp(),
                "scopes": ["ads_read", "read_insights"]
            }
        }),
    )
    .await;
    let credential = create_live_credential(&db, USER).await.unwrap();

    let token = validator(&db, &server)
        .ensure_valid_token(USER)
        .await
        .unwrap();

    assert_eq!(token.credential_id, credential.id);
    assert_eq!(token.access_token.expose(), "user-token");

    let stored = CredentialRepository::new(db.clone())
        .find_by_user(USER)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.requires_reauth);
    assert!(stored.last_validated_at.is_some());
    assert_eq!(stored.expires_at.timestamp(), revised.timestamp());
}

#[tokio::test]
async fn zero_expiry_keeps_stored_expiry() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_debug_token(
        &server,
        200,
        json!({ "data": { "is_valid": true, "expires_at": 0 } }),
    )
    .await;
    let credential = create_live_credential(&db, USER).await.unwrap();

    let outcome = validator(&db, &server).validate(USER).await.unwrap();
    assert!(matches!(outcome, ValidationOutcome::Valid(_)));

    let stored = CredentialRepository::new(db.clone())
        .find_by_user(USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        stored.expires_at.timestamp(),
        credential.expires_at.timestamp()
    );
}
