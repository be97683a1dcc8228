//! HTTP server and API handlers
//!
//! Exposes the chat loop, form generation, conversation context, and
//! operational endpoints over JSON. Handlers never surface AI failures:
//! the client wrapper degrades to deterministic fallback text and the
//! response carries a `fallback` block describing the degradation.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::actions::{self, FormAction};
use crate::ai::{ChatMessage, CompletionOptions, FallbackInfo, SafeAIClient};
use crate::config::Config;
use crate::conversation::{
    ConversationContext, ConversationHistoryService, ConversationId, FormSummary, Role,
};
use crate::error::{FormAgentError, Result};
use crate::forms::FormDraft;
use crate::guardrails::{DesignIssueKind, GuardrailsEngine, SafetyWarning, Severity, ViolationRecord};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Service configuration
    pub config: Config,
    /// Conversation memory service
    pub service: Arc<ConversationHistoryService>,
    /// Content and form-design guardrails
    pub guardrails: Arc<GuardrailsEngine>,
    /// Non-throwing AI client
    pub ai: Arc<SafeAIClient>,
}

/// The main API server
pub struct FormAgentServer {
    state: AppState,
}

impl FormAgentServer {
    pub fn new(
        config: Config,
        service: Arc<ConversationHistoryService>,
        guardrails: Arc<GuardrailsEngine>,
        ai: Arc<SafeAIClient>,
    ) -> Self {
        Self {
            state: AppState {
                config,
                service,
                guardrails,
                ai,
            },
        }
    }

    /// Bind the listener, spawn maintenance, and serve until shutdown
    pub async fn serve(&self) -> Result<()> {
        let state = self.state.clone();
        let app = create_router(state.clone());

        let addr: SocketAddr = state
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| FormAgentError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Starting FormAgent server on {addr}");
        if state.ai.is_enabled() {
            tracing::info!("AI backend enabled (provider: {})", state.config.ai.provider);
        } else {
            tracing::info!("AI backend disabled, serving deterministic fallbacks");
        }

        let maintenance = tokio::spawn(maintenance_loop(
            state.service.clone(),
            state.config.memory.maintenance_interval_secs,
        ));

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| FormAgentError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| FormAgentError::Server(format!("Server error: {e}")))?;

        maintenance.abort();
        tracing::info!("FormAgent server shut down gracefully");
        Ok(())
    }
}

/// Periodic cache eviction and conversation archival
async fn maintenance_loop(service: Arc<ConversationHistoryService>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        service.maintenance_sweep().await;
    }
}

/// Create the router with all routes configured
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/forms/generate", post(generate_form_handler))
        .route("/api/conversations/{id}/context", get(context_handler))
        .route("/api/conversations/{id}/greeting", get(greeting_handler))
        .route("/api/guardrails/stats", get(guardrails_stats_handler))
        .route("/api/maintenance/sweep", post(maintenance_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

/// Current form the client is editing, echoed into the system prompt
#[derive(Debug, Clone, Deserialize)]
pub struct FormContextBody {
    pub title: String,
    pub field_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Client session identifier, stamped on the conversation when it
    /// is first created
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    /// Form currently open in the client, if any
    #[serde(default)]
    pub form: Option<FormContextBody>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    /// Structured mutations extracted from the assistant text
    pub actions: Vec<FormAction>,
    /// Non-blocking sensitive-data warnings on the user message
    pub warnings: Vec<SafetyWarning>,
    pub conversation_id: String,
    pub message_id: String,
    /// Which backend produced the reply
    pub service: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackInfo>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateFormRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Natural-language description of the form to build
    pub description: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateFormResponse {
    pub form: FormDraft,
    /// Non-blocking design warnings (e.g. disclaimer suggestions)
    pub warnings: Vec<String>,
    pub service: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackInfo>,
}

#[derive(Debug, Deserialize)]
pub struct GreetingParams {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Health endpoint; probes the AI backend
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let ai = state.ai.health_check().await;
    Json(serde_json::json!({
        "status": "ok",
        "ai": ai,
        "cached_conversations": state.service.cached_conversations(),
    }))
}

/// Chat turn: guardrails, memory, AI call, action extraction
async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let conversation_id = match ConversationId::try_from(request.conversation_id.as_str()) {
        Ok(id) => id,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_conversation_id",
                &e.to_string(),
            );
        }
    };
    let user_id = request
        .user_id
        .unwrap_or_else(|| format!("anon_{}", Uuid::new_v4()));
    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Blocking safety gate on inbound content; warnings pass through
    let safety = state.guardrails.check_content_safety(&request.message);
    if !safety.safe {
        state
            .guardrails
            .log_safety_violations(&safety, conversation_id.as_str());
        tracing::warn!(
            "Rejected unsafe message on {}: {} violation(s)",
            conversation_id,
            safety.violations.len()
        );
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": {
                    "type": "unsafe_content",
                    "message": "Nội dung tin nhắn vi phạm chính sách an toàn.",
                },
                "violations": safety.violations,
            })),
        )
            .into_response();
    }

    // Materialize the conversation first so a brand-new one carries the
    // caller's session id
    state
        .service
        .get_or_create(&conversation_id, &user_id, &session_id)
        .await;

    let outcome = match state
        .service
        .add_message(&conversation_id, Role::User, &request.message, &user_id)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Failed to record message on {conversation_id}: {e}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "Không thể lưu tin nhắn, vui lòng thử lại.",
            );
        }
    };

    let context = state
        .service
        .get_context(&conversation_id, state.config.memory.context_max_tokens)
        .await;

    let mut messages = Vec::new();
    if let Some(ref ctx) = context {
        messages.push(ChatMessage::new(
            Role::System,
            build_system_prompt(ctx, request.form.as_ref()),
        ));
        for m in &ctx.short_term {
            messages.push(ChatMessage::new(m.role, m.content.clone()));
        }
    } else {
        messages.push(ChatMessage::new(Role::User, request.message.clone()));
    }

    let completion = state
        .ai
        .create_chat_completion(&messages, &CompletionOptions::default())
        .await;

    let parsed = actions::parse(&completion.response);
    let topic = context
        .as_ref()
        .and_then(|c| c.key_topics.first())
        .map(|t| t.topic.clone());
    let reply = state
        .guardrails
        .improve_response(&parsed.text, topic.as_deref());

    // Store the cleaned reply so memory never carries action tokens
    if let Err(e) = state
        .service
        .add_message(&conversation_id, Role::Assistant, &reply, &user_id)
        .await
    {
        tracing::warn!("Failed to record assistant reply on {conversation_id}: {e}");
    }

    Json(ChatResponse {
        reply,
        actions: parsed.actions,
        warnings: outcome.safety.warnings,
        conversation_id: conversation_id.to_string(),
        message_id: outcome.message_id,
        service: completion.service,
        fallback: completion.fallback,
    })
    .into_response()
}

/// Generate a form draft from a description
///
/// The AI path asks the model for ADD_FIELD tokens; when it falls back
/// or yields no fields, a static contact template is used so the caller
/// always receives a usable draft.
async fn generate_form_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateFormRequest>,
) -> Response {
    let conversation_id = match ConversationId::try_from(request.conversation_id.as_str()) {
        Ok(id) => id,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_conversation_id",
                &e.to_string(),
            );
        }
    };

    let safety = state.guardrails.check_content_safety(&request.description);
    if !safety.safe {
        state
            .guardrails
            .log_safety_violations(&safety, conversation_id.as_str());
        return error_response(
            StatusCode::BAD_REQUEST,
            "unsafe_content",
            "Mô tả form vi phạm chính sách an toàn.",
        );
    }

    let title = request
        .title
        .clone()
        .unwrap_or_else(|| "Form mới".to_string());

    let prompt = [
        ChatMessage::new(Role::System, form_generation_prompt()),
        ChatMessage::new(Role::User, request.description.clone()),
    ];
    let completion = state
        .ai
        .create_chat_completion(&prompt, &CompletionOptions::default())
        .await;

    let mut draft = FormDraft::new(title.clone(), request.description.clone());
    let parsed = actions::parse(&completion.response);
    let applied = if completion.is_fallback() {
        0
    } else {
        draft.apply_all(&parsed.actions)
    };
    let (draft, service) = if applied == 0 {
        (default_contact_form(title, request.description), "template")
    } else {
        (draft, completion.service)
    };

    let design = state.guardrails.validate_form_design(&draft);
    if !design.safe {
        for issue in &design.issues {
            state.guardrails.log_violation(ViolationRecord::new(
                format!("{:?}", issue.kind),
                Severity::Medium,
                issue.reason.clone(),
            ));
        }
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": {
                    "type": "invalid_form_design",
                    "message": "Thiết kế form chứa trường không được phép.",
                },
                "issues": design.issues,
            })),
        )
            .into_response();
    }
    let warnings: Vec<String> = design
        .issues
        .iter()
        .filter(|i| i.kind == DesignIssueKind::NeedsDisclaimer)
        .map(|i| i.reason.clone())
        .collect();

    state
        .service
        .record_form_creation(
            &conversation_id,
            FormSummary {
                title: draft.title.clone(),
                field_count: draft.fields.len(),
                created_at: chrono::Utc::now(),
            },
        )
        .await;

    Json(GenerateFormResponse {
        form: draft,
        warnings,
        service,
        fallback: completion.fallback,
    })
    .into_response()
}

/// Assembled context for a conversation
async fn context_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let conversation_id = match ConversationId::try_from(id.as_str()) {
        Ok(id) => id,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_conversation_id",
                &e.to_string(),
            );
        }
    };

    match state
        .service
        .get_context(&conversation_id, state.config.memory.context_max_tokens)
        .await
    {
        Some(context) => Json(context).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "conversation_not_found",
            &format!("No conversation with id '{conversation_id}'"),
        ),
    }
}

/// Contextual greeting keyed to user familiarity
async fn greeting_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<GreetingParams>,
) -> Response {
    let conversation_id = match ConversationId::try_from(id.as_str()) {
        Ok(id) => id,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_conversation_id",
                &e.to_string(),
            );
        }
    };
    let user_id = params
        .user_id
        .unwrap_or_else(|| format!("anon_{}", Uuid::new_v4()));

    let greeting = state
        .service
        .contextual_greeting(&conversation_id, &user_id)
        .await;
    Json(greeting).into_response()
}

/// Violation counts grouped by type
async fn guardrails_stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "violations": state.guardrails.violation_stats(),
    }))
}

/// Trigger one maintenance sweep on demand
async fn maintenance_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (evicted, archived) = state.service.maintenance_sweep().await;
    Json(serde_json::json!({
        "evicted": evicted,
        "archived": archived,
    }))
}

/// Merge personality, memory, and form context into a system prompt
fn build_system_prompt(context: &ConversationContext, form: Option<&FormContextBody>) -> String {
    let mut prompt = format!(
        "Bạn là {}, trợ lý tạo form thu thập dữ liệu. Trả lời bằng ngôn ngữ '{}' với giọng điệu {}.",
        context.assistant_name, context.language, context.tone
    );

    for guideline in &context.guidelines {
        prompt.push_str("\n- ");
        prompt.push_str(guideline);
    }

    if let Some(form) = form {
        prompt.push_str(&format!(
            "\nNgười dùng đang chỉnh sửa Form \"{}\" ({} trường).",
            form.title, form.field_count
        ));
    }

    if !context.long_term.is_empty() {
        prompt.push_str("\nTóm tắt hội thoại trước đó:\n");
        prompt.push_str(&context.long_term);
    }

    if !context.key_topics.is_empty() {
        let topics: Vec<&str> = context.key_topics.iter().map(|t| t.topic.as_str()).collect();
        prompt.push_str(&format!("\nChủ đề chính: {}.", topics.join(", ")));
    }

    prompt.push_str(
        "\nKhi cần thay đổi form, chèn đúng các lệnh sau vào câu trả lời:\n\
         UPDATE_FIELD:<fieldId>:<property>:<value>\n\
         DELETE_FIELD:<fieldId>\n\
         ADD_FIELD:<type>:<label>:<required>\n\
         SAVE_FORM:confirm\n\
         UPDATE_SETTING:<setting>:<value>",
    );

    prompt
}

/// System prompt for the form-generation endpoint
fn form_generation_prompt() -> String {
    "Bạn là công cụ thiết kế form. Từ mô tả của người dùng, đề xuất các trường cần có \
     và trả về mỗi trường trên một dòng bằng lệnh ADD_FIELD:<type>:<label>:<required>, \
     trong đó <type> thuộc {text, email, number, date, select, textarea, checkbox} và \
     <required> là true hoặc false. Không thêm lệnh nào khác."
        .to_string()
}

/// Static template used when AI yields no usable fields
fn default_contact_form(title: String, description: String) -> FormDraft {
    let mut draft = FormDraft::new(title, description);
    draft.apply_all(&[
        FormAction::AddField {
            field_type: "text".to_string(),
            label: "Họ và tên".to_string(),
            required: true,
        },
        FormAction::AddField {
            field_type: "email".to_string(),
            label: "Email".to_string(),
            required: true,
        },
        FormAction::AddField {
            field_type: "textarea".to_string(),
            label: "Nội dung".to_string(),
            required: false,
        },
    ]);
    draft
}

fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        })),
    )
        .into_response()
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
