//! Integration tests for the safe AI client
//!
//! Exercises the non-throwing contract against a mock provider: every
//! failure class degrades to fallback text with the correct kind, and a
//! healthy provider yields real completions with usage accounting.

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use formagent::ai::{AiErrorKind, ChatMessage, CompletionOptions, SafeAIClient};
use formagent::config::AiConfig;
use formagent::conversation::Role;
use formagent::fallback::FallbackResponder;

// =============================================================================
// Test Fixtures
// =============================================================================

fn responder() -> FallbackResponder {
    FallbackResponder::new("FormAgent")
}

fn config_for(server: &MockServer, key_env: &str) -> AiConfig {
    unsafe { std::env::set_var(key_env, "test-key-123456") };
    AiConfig {
        base_url: server.uri(),
        api_key_env: key_env.to_string(),
        ..AiConfig::default()
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [
            {"message": {"role": "assistant", "content": content}}
        ],
        "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
    })
}

fn user_messages() -> Vec<ChatMessage> {
    vec![ChatMessage::new(Role::User, "tạo form đăng ký sự kiện")]
}

// =============================================================================
// Successful Completions
// =============================================================================

#[tokio::test]
async fn test_successful_completion_passes_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key-123456"))
        .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "Đã tạo form. ADD_FIELD:text:Họ và tên:true",
        )))
        .mount(&server)
        .await;

    let client = SafeAIClient::new(&config_for(&server, "FA_TEST_OK_KEY"), responder());
    assert!(client.is_enabled());

    let outcome = client
        .create_chat_completion(&user_messages(), &CompletionOptions::default())
        .await;

    assert!(!outcome.is_fallback());
    assert_eq!(outcome.service, "openai");
    assert!(outcome.response.contains("ADD_FIELD"));
    assert_eq!(outcome.usage.unwrap().total_tokens, 20);
}

#[tokio::test]
async fn test_per_call_options_override_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"max_tokens": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let client = SafeAIClient::new(&config_for(&server, "FA_TEST_OPT_KEY"), responder());
    let options = CompletionOptions {
        max_tokens: Some(5),
        temperature: Some(0.0),
    };

    let outcome = client
        .create_chat_completion(&user_messages(), &options)
        .await;
    assert!(!outcome.is_fallback());
}

// =============================================================================
// Failure Classification
// =============================================================================

#[tokio::test]
async fn test_auth_failure_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = SafeAIClient::new(&config_for(&server, "FA_TEST_401_KEY"), responder());
    let outcome = client
        .create_chat_completion(&user_messages(), &CompletionOptions::default())
        .await;

    let info = outcome.fallback.as_ref().expect("fallback");
    assert_eq!(info.kind, AiErrorKind::Auth);
    assert_eq!(outcome.service, "fallback");
    assert!(!outcome.response.is_empty());
}

#[tokio::test]
async fn test_not_found_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = SafeAIClient::new(&config_for(&server, "FA_TEST_404_KEY"), responder());
    let outcome = client
        .create_chat_completion(&user_messages(), &CompletionOptions::default())
        .await;

    assert_eq!(outcome.fallback.unwrap().kind, AiErrorKind::NotFound);
}

#[tokio::test]
async fn test_rate_limit_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = SafeAIClient::new(&config_for(&server, "FA_TEST_429_KEY"), responder());
    let outcome = client
        .create_chat_completion(&user_messages(), &CompletionOptions::default())
        .await;

    assert_eq!(outcome.fallback.unwrap().kind, AiErrorKind::RateLimited);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = SafeAIClient::new(&config_for(&server, "FA_TEST_500_KEY"), responder());
    let outcome = client
        .create_chat_completion(&user_messages(), &CompletionOptions::default())
        .await;

    let info = outcome.fallback.unwrap();
    assert_eq!(info.kind, AiErrorKind::Transient);
    assert!(info.original_error.unwrap().contains("500"));
}

#[tokio::test]
async fn test_malformed_response_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let client = SafeAIClient::new(&config_for(&server, "FA_TEST_BAD_KEY"), responder());
    let outcome = client
        .create_chat_completion(&user_messages(), &CompletionOptions::default())
        .await;

    assert_eq!(outcome.fallback.unwrap().kind, AiErrorKind::Transient);
}

#[tokio::test]
async fn test_empty_choices_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
        )
        .mount(&server)
        .await;

    let client = SafeAIClient::new(&config_for(&server, "FA_TEST_EMPTY_KEY"), responder());
    let outcome = client
        .create_chat_completion(&user_messages(), &CompletionOptions::default())
        .await;

    assert_eq!(outcome.fallback.unwrap().kind, AiErrorKind::Transient);
}

// =============================================================================
// Health Check
// =============================================================================

#[tokio::test]
async fn test_health_check_healthy_with_working_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("pong")))
        .mount(&server)
        .await;

    let client = SafeAIClient::new(&config_for(&server, "FA_TEST_HC_KEY"), responder());
    let health = client.health_check().await;

    assert!(health.healthy);
    assert!(health.reason.contains("openai"));
}

#[tokio::test]
async fn test_health_check_unhealthy_on_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = SafeAIClient::new(&config_for(&server, "FA_TEST_HC2_KEY"), responder());
    let health = client.health_check().await;

    assert!(!health.healthy);
    assert!(health.reason.contains("503"));
}
