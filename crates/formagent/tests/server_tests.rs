//! End-to-end API tests with a mock AI provider
//!
//! Drives the full chat and form-generation flows through the router
//! with a wiremock-backed provider, covering action extraction, design
//! rejection, and the static template path when the provider is down.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tower::util::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use formagent::ai::SafeAIClient;
use formagent::config::Config;
use formagent::conversation::{ConversationHistoryService, MemoryRepository};
use formagent::fallback::FallbackResponder;
use formagent::guardrails::GuardrailsEngine;
use formagent::server::{AppState, create_router};

// =============================================================================
// Test Fixtures
// =============================================================================

fn state_with_ai(ai: SafeAIClient) -> AppState {
    let config = Config::default();
    let guardrails = Arc::new(GuardrailsEngine::new(config.guardrails.clone()));
    let service = Arc::new(ConversationHistoryService::new(
        Arc::new(MemoryRepository::new()),
        guardrails.clone(),
        config.memory.clone(),
        config.personality.clone(),
    ));
    AppState {
        config,
        service,
        guardrails,
        ai: Arc::new(ai),
    }
}

async fn mock_ai(content: &str, key_env: &str) -> SafeAIClient {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20}
        })))
        .mount(&server)
        .await;

    unsafe { std::env::set_var(key_env, "test-key") };
    let ai_config = formagent::config::AiConfig {
        base_url: server.uri(),
        api_key_env: key_env.to_string(),
        ..formagent::config::AiConfig::default()
    };
    // The mock server must outlive the client
    std::mem::forget(server);
    SafeAIClient::new(&ai_config, FallbackResponder::new("FormAgent"))
}

async fn post_json(
    router: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// =============================================================================
// Chat Flow
// =============================================================================

#[tokio::test]
async fn test_chat_extracts_actions_and_cleans_reply() {
    let ai = mock_ai(
        "Đã cập nhật trường email cho bạn. UPDATE_FIELD:email:required:true Bạn cần gì thêm không?",
        "FA_SRV_CHAT_KEY",
    )
    .await;
    let router = create_router(state_with_ai(ai));

    let (status, body) = post_json(
        router,
        "/api/chat",
        serde_json::json!({
            "conversation_id": "conv-1",
            "user_id": "u1",
            "message": "đặt email là bắt buộc",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "openai");

    let actions = body["actions"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["type"], "updateField");
    assert_eq!(actions[0]["fieldId"], "email");
    assert_eq!(actions[0]["property"], "required");
    assert_eq!(actions[0]["value"], "true");

    let reply = body["reply"].as_str().unwrap();
    assert!(!reply.contains("UPDATE_FIELD"));
    assert!(reply.contains("Đã cập nhật trường email"));
}

#[tokio::test]
async fn test_chat_stores_both_turns_in_memory() {
    let ai = mock_ai("Mình đã ghi nhận yêu cầu của bạn rồi nhé.", "FA_SRV_MEM_KEY").await;
    let state = state_with_ai(ai);
    let router = create_router(state.clone());

    post_json(
        router.clone(),
        "/api/chat",
        serde_json::json!({
            "conversation_id": "conv-1",
            "message": "tạo form khảo sát",
        }),
    )
    .await;

    let request = Request::builder()
        .uri("/api/conversations/conv-1/context")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let short_term = body["short_term"].as_array().unwrap();
    assert_eq!(short_term.len(), 2);
    assert_eq!(short_term[0]["role"], "user");
    assert_eq!(short_term[1]["role"], "assistant");
}

// =============================================================================
// Form Generation Flow
// =============================================================================

#[tokio::test]
async fn test_generate_form_builds_fields_from_actions() {
    let ai = mock_ai(
        "ADD_FIELD:text:Họ và tên:true\nADD_FIELD:email:Email:true\nADD_FIELD:date:Ngày sinh:false",
        "FA_SRV_FORM_KEY",
    )
    .await;
    let router = create_router(state_with_ai(ai));

    let (status, body) = post_json(
        router,
        "/api/forms/generate",
        serde_json::json!({
            "conversation_id": "conv-1",
            "description": "form đăng ký thành viên",
            "title": "Đăng ký thành viên",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "openai");
    assert_eq!(body["form"]["title"], "Đăng ký thành viên");

    let fields = body["form"]["fields"].as_array().unwrap();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[0]["label"], "Họ và tên");
    assert_eq!(fields[0]["required"], true);
    assert_eq!(fields[1]["type"], "email");
    assert_eq!(fields[2]["required"], false);
}

#[tokio::test]
async fn test_generate_form_rejects_forbidden_fields() {
    let ai = mock_ai(
        "ADD_FIELD:text:Họ và tên:true\nADD_FIELD:text:Credit Card Number:true",
        "FA_SRV_FORBID_KEY",
    )
    .await;
    let router = create_router(state_with_ai(ai));

    let (status, body) = post_json(
        router,
        "/api/forms/generate",
        serde_json::json!({
            "conversation_id": "conv-1",
            "description": "form thanh toán",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_form_design");
    assert!(!body["issues"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_generate_form_records_in_conversation_history() {
    let ai = mock_ai("ADD_FIELD:text:Tên:true", "FA_SRV_HIST_KEY").await;
    let state = state_with_ai(ai);
    let router = create_router(state.clone());

    post_json(
        router.clone(),
        "/api/forms/generate",
        serde_json::json!({
            "conversation_id": "conv-1",
            "description": "form ngắn",
            "title": "Form ngắn",
        }),
    )
    .await;

    let request = Request::builder()
        .uri("/api/conversations/conv-1/greeting?user_id=u1")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert!(
        body["personal_touch"]
            .as_str()
            .unwrap()
            .contains("Form ngắn")
    );
}
