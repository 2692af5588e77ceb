use std::sync::Arc;

use kubeassist_core::CredentialLifecycleManager;
use kubeassist_core::ModelFactory;
use kubeassist_core::ProviderDescriptor;
use kubeassist_core::model_provider::ChatMessage;
use kubeassist_core::model_provider::DirectKeyVendor;
use kubeassist_core::model_provider::ModelError;
use kubeassist_core::model_provider::ProviderRegistry;
use kubeassist_core::model_provider::Secret;
use kubeassist_core::provider_auth::AuthError;
use kubeassist_core::provider_auth::CopilotTokenExchanger;
use kubeassist_core::provider_auth::FileCredentialStore;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_partial_json;
use wiremock::matchers::header;
use wiremock::matchers::header_exists;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn keyed(vendor: DirectKeyVendor, base_url: String) -> ProviderDescriptor {
    ProviderDescriptor::DirectKey {
        vendor,
        api_key: Secret::new("test-key"),
        base_url: Some(base_url),
        model: None,
    }
}

fn factory(id: &str, descriptor: ProviderDescriptor) -> ModelFactory {
    let mut registry = ProviderRegistry::new();
    registry.register(id, descriptor);
    ModelFactory::new(registry, reqwest::Client::new(), None)
}

fn prompt() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are a Kubernetes assistant."),
        ChatMessage::user("How do I list pods?"),
    ]
}

#[tokio::test]
async fn openai_chat_completions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({ "model": "gpt-4o", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "kubectl get pods" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let factory = factory(
        "openai",
        keyed(DirectKeyVendor::OpenAi, format!("{}/v1", server.uri())),
    );
    let handle = factory.build("openai", None).unwrap();
    assert_eq!(handle.chat(&prompt()).await.unwrap(), "kubectl get pods");
}

#[tokio::test]
async fn anthropic_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({ "system": "You are a Kubernetes assistant." })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "Use kubectl get pods." }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = factory("anthropic", keyed(DirectKeyVendor::Anthropic, server.uri()))
        .build("anthropic", Some("claude-test"))
        .unwrap();
    assert_eq!(handle.chat(&prompt()).await.unwrap(), "Use kubectl get pods.");
}

#[tokio::test]
async fn gemini_generate_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "kubectl get po" }] } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = factory("gemini", keyed(DirectKeyVendor::Gemini, server.uri()))
        .build("gemini", Some("gemini-test"))
        .unwrap();
    assert_eq!(handle.chat(&prompt()).await.unwrap(), "kubectl get po");
}

#[tokio::test]
async fn ollama_chat_needs_no_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({ "model": "llama3.1", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "local answer" },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = factory("ollama", ProviderDescriptor::ollama(Some(server.uri())))
        .build("ollama", None)
        .unwrap();
    assert_eq!(handle.chat(&prompt()).await.unwrap(), "local answer");
}

#[tokio::test]
async fn api_errors_carry_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "error": { "message": "invalid x-api-key" } })),
        )
        .mount(&server)
        .await;

    let handle = factory("anthropic", keyed(DirectKeyVendor::Anthropic, server.uri()))
        .build("anthropic", None)
        .unwrap();
    let err = handle.chat(&prompt()).await.unwrap_err();
    match &err {
        ModelError::Api { status, message, .. } => {
            assert_eq!(status.as_u16(), 401);
            assert_eq!(message, "invalid x-api-key");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn copilot_handle_fetches_token_per_call() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/copilot_internal/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tid=copilot",
            "expires_at": chrono::Utc::now().timestamp() + 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer tid=copilot"))
        .and(header("copilot-integration-id", "vscode-chat"))
        .and(header_exists("editor-version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "from copilot" } }]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let store = Arc::new(
        FileCredentialStore::new(home.path()).with_env_fallback(Some("gho_test".to_string())),
    );
    let exchanger = CopilotTokenExchanger::with_url(
        reqwest::Client::new(),
        format!("{}/copilot_internal/v2/token", server.uri()),
    );
    let credentials = Arc::new(CredentialLifecycleManager::new(store, Arc::new(exchanger)));

    let mut registry = ProviderRegistry::new();
    registry.register(
        "copilot",
        ProviderDescriptor::Delegated {
            authenticated: true,
            base_url: Some(server.uri()),
            model: None,
        },
    );
    let factory = ModelFactory::new(registry, reqwest::Client::new(), Some(credentials));

    let handle = factory.build_default(None).unwrap();
    assert_eq!(handle.provider_id(), "copilot");
    assert_eq!(handle.chat(&prompt()).await.unwrap(), "from copilot");
    assert_eq!(handle.chat(&prompt()).await.unwrap(), "from copilot");
}

#[tokio::test]
async fn unauthenticated_copilot_builds_but_fails_on_first_call() {
    let home = TempDir::new().unwrap();
    let store = Arc::new(FileCredentialStore::new(home.path()));
    let exchanger = CopilotTokenExchanger::with_url(reqwest::Client::new(), "http://127.0.0.1:9/");
    let credentials = Arc::new(CredentialLifecycleManager::new(store, Arc::new(exchanger)));

    let mut registry = ProviderRegistry::new();
    registry.register("copilot", ProviderDescriptor::copilot(false));
    let factory = ModelFactory::new(registry, reqwest::Client::new(), Some(credentials));

    let handle = factory.build_default(None).unwrap();
    let err = handle.chat(&prompt()).await.unwrap_err();
    assert!(matches!(err, ModelError::Auth(AuthError::NotAuthenticated)));
}
