use std::sync::Arc;

use kubeassist_core::CredentialLifecycleManager;
use kubeassist_core::provider_auth::AuthError;
use kubeassist_core::provider_auth::CopilotTokenExchanger;
use kubeassist_core::provider_auth::CredentialStore;
use kubeassist_core::provider_auth::FileCredentialStore;
use kubeassist_core::provider_auth::StoredCredential;
use kubeassist_core::provider_auth::TokenStatus;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

const TOKEN_PATH: &str = "/copilot_internal/v2/token";

fn manager(
    home: &TempDir,
    server: &MockServer,
) -> (Arc<FileCredentialStore>, CredentialLifecycleManager) {
    let store = Arc::new(FileCredentialStore::new(home.path()));
    let exchanger = CopilotTokenExchanger::with_url(
        reqwest::Client::new(),
        format!("{}{TOKEN_PATH}", server.uri()),
    );
    let manager = CredentialLifecycleManager::new(store.clone(), Arc::new(exchanger));
    (store, manager)
}

fn expires_in(secs: i64) -> i64 {
    chrono::Utc::now().timestamp() + secs
}

#[tokio::test]
async fn stored_credential_is_exchanged_once_while_fresh() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .and(header("authorization", "token gho_stored"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "token": "tid=1", "expires_at": expires_in(3600) })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (store, manager) = manager(&home, &server);
    store.save(&StoredCredential::new("gho_stored")).unwrap();

    assert_eq!(manager.ensure_token().await.unwrap(), "tid=1");
    assert_eq!(manager.ensure_token().await.unwrap(), "tid=1");
    assert!(matches!(manager.status(), TokenStatus::Valid { .. }));
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "token": "tid=near", "expires_at": expires_in(60) })),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let (store, manager) = manager(&home, &server);
    store.save(&StoredCredential::new("gho_stored")).unwrap();
    assert_eq!(manager.ensure_token().await.unwrap(), "tid=near");

    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_millis(100))
                .set_body_json(json!({ "token": "tid=fresh", "expires_at": expires_in(3600) })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (a, b) = tokio::join!(manager.ensure_token(), manager.ensure_token());
    assert_eq!(a.unwrap(), "tid=fresh");
    assert_eq!(b.unwrap(), "tid=fresh");
}

#[tokio::test]
async fn revoked_credential_is_removed_from_disk() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (store, manager) = manager(&home, &server);
    store.save(&StoredCredential::new("gho_revoked")).unwrap();
    assert!(store.path().exists());

    let err = manager.ensure_token().await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshFailed(_)));
    assert!(err.to_string().contains("kubeassist auth login"));
    assert!(!store.path().exists());
    assert_eq!(manager.status(), TokenStatus::Invalid);
}

#[tokio::test]
async fn env_fallback_credential_is_used() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "token ghp_env"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "token": "tid=env", "expires_at": expires_in(3600) })),
        )
        .mount(&server)
        .await;

    let store = Arc::new(
        FileCredentialStore::new(home.path()).with_env_fallback(Some("ghp_env".to_string())),
    );
    let exchanger = CopilotTokenExchanger::with_url(
        reqwest::Client::new(),
        format!("{}{TOKEN_PATH}", server.uri()),
    );
    let manager = CredentialLifecycleManager::new(store, Arc::new(exchanger));

    assert!(manager.has_stored_credential());
    assert_eq!(manager.ensure_token().await.unwrap(), "tid=env");
}
