//! Safe AI client
//!
//! Wraps the hosted LLM call behind a non-throwing surface: every
//! request yields usable text. Construction failures disable the client
//! permanently for the process lifetime; call failures are classified
//! and routed to the deterministic fallback responder. Degradation is
//! signalled only through `ChatOutcome::fallback`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::AiConfig;
use crate::conversation::Role;
use crate::fallback::FallbackResponder;

/// A role-tagged message sent to the completion API
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Classified failure classes for provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AiErrorKind {
    /// Missing or invalid provider configuration
    Config,
    /// 401/403 from the provider
    Auth,
    /// 404: bad deployment or endpoint
    NotFound,
    /// 429 from the provider
    RateLimited,
    /// Timeouts, connection failures, 5xx, malformed responses
    Transient,
}

/// Degradation details attached to a fallback outcome
#[derive(Debug, Clone, Serialize)]
pub struct FallbackInfo {
    pub kind: AiErrorKind,
    /// Original provider error, for diagnostics only
    pub original_error: Option<String>,
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Result of a chat completion; always carries usable response text
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: String,
    pub usage: Option<Usage>,
    /// Which service produced the text ("openai", "azure", "fallback")
    pub service: &'static str,
    /// Present iff the deterministic fallback produced the text
    pub fallback: Option<FallbackInfo>,
}

impl ChatOutcome {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Health check result
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub healthy: bool,
    pub reason: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Where the api key travels for each provider variant
enum AuthHeader {
    Bearer,
    ApiKey,
}

struct ProviderClient {
    http: Client,
    url: String,
    auth: AuthHeader,
    api_key: String,
    /// Short redacted preview for diagnostics; the full key is never logged
    key_preview: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    service: &'static str,
}

enum ClientState {
    Enabled(ProviderClient),
    Disabled { reason: String },
}

/// LLM client that never raises to its caller
pub struct SafeAIClient {
    state: ClientState,
    responder: FallbackResponder,
}

impl SafeAIClient {
    /// Build the client; any construction error disables it permanently
    ///
    /// There is no auto-retry out of the disabled state: a process with
    /// bad AI configuration serves deterministic fallbacks until restart.
    pub fn new(config: &AiConfig, responder: FallbackResponder) -> Self {
        let state = match Self::build_provider(config) {
            Ok(provider) => {
                info!(
                    "AI client enabled: service={}, model={}",
                    provider.service, provider.model
                );
                ClientState::Enabled(provider)
            }
            Err(reason) => {
                warn!("AI client disabled for process lifetime: {reason}");
                ClientState::Disabled { reason }
            }
        };
        Self { state, responder }
    }

    /// Construct a client that always answers from the fallback responder
    pub fn disabled(reason: impl Into<String>, responder: FallbackResponder) -> Self {
        Self {
            state: ClientState::Disabled {
                reason: reason.into(),
            },
            responder,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, ClientState::Enabled(_))
    }

    fn build_provider(config: &AiConfig) -> Result<ProviderClient, String> {
        if !config.enabled {
            return Err("AI disabled in configuration".to_string());
        }

        let api_key = env::var(&config.api_key_env)
            .map_err(|_| format!("API key env var '{}' not set", config.api_key_env))?;
        if api_key.trim().is_empty() {
            return Err(format!("API key env var '{}' is empty", config.api_key_env));
        }

        let (url, auth, service) = match config.provider.as_str() {
            "azure" => {
                if config.endpoint.is_empty() || config.deployment.is_empty() {
                    return Err(
                        "Azure provider requires both endpoint and deployment".to_string()
                    );
                }
                let url = format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    config.endpoint.trim_end_matches('/'),
                    config.deployment,
                    config.api_version
                );
                (url, AuthHeader::ApiKey, "azure")
            }
            _ => {
                let url = format!(
                    "{}/chat/completions",
                    config.base_url.trim_end_matches('/')
                );
                (url, AuthHeader::Bearer, "openai")
            }
        };

        Url::parse(&url).map_err(|e| format!("Invalid provider URL '{url}': {e}"))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        let key_preview: String = api_key.chars().take(6).chain("…".chars()).collect();

        Ok(ProviderClient {
            http,
            url,
            auth,
            api_key,
            key_preview,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            service,
        })
    }

    /// Request a completion; never raises
    ///
    /// On any provider failure the deterministic fallback text is
    /// returned, with the failure class and original error attached.
    pub async fn create_chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> ChatOutcome {
        let provider = match &self.state {
            ClientState::Enabled(provider) => provider,
            ClientState::Disabled { reason } => {
                debug!("AI client disabled, answering from fallback: {reason}");
                return self.fallback_outcome(messages, AiErrorKind::Config, Some(reason.clone()));
            }
        };

        match self.call_provider(provider, messages, options).await {
            Ok((response, usage)) => ChatOutcome {
                response,
                usage,
                service: provider.service,
                fallback: None,
            },
            Err((kind, detail)) => {
                error!(
                    "AI call failed: service={}, kind={kind:?}, key={}, model={}: {detail}",
                    provider.service, provider.key_preview, provider.model
                );
                self.fallback_outcome(messages, kind, Some(detail))
            }
        }
    }

    async fn call_provider(
        &self,
        provider: &ProviderClient,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<(String, Option<Usage>), (AiErrorKind, String)> {
        let request = ChatCompletionRequest {
            model: provider.model.clone(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: options.temperature.unwrap_or(provider.temperature),
            max_tokens: options.max_tokens.unwrap_or(provider.max_tokens),
        };

        let mut builder = provider.http.post(&provider.url).json(&request);
        builder = match provider.auth {
            AuthHeader::Bearer => {
                builder.header("Authorization", format!("Bearer {}", provider.api_key))
            }
            AuthHeader::ApiKey => builder.header("api-key", provider.api_key.clone()),
        };

        let response = builder.send().await.map_err(|e| {
            let kind = AiErrorKind::Transient;
            if e.is_timeout() {
                (kind, format!("request timed out: {e}"))
            } else {
                (kind, format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let kind = match status.as_u16() {
                401 | 403 => AiErrorKind::Auth,
                404 => AiErrorKind::NotFound,
                429 => AiErrorKind::RateLimited,
                _ => AiErrorKind::Transient,
            };
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable body".to_string());
            return Err((kind, format!("provider returned {status}: {body}")));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| (AiErrorKind::Transient, format!("malformed response: {e}")))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or((AiErrorKind::Transient, "empty choices".to_string()))?;

        Ok((text, completion.usage))
    }

    fn fallback_outcome(
        &self,
        messages: &[ChatMessage],
        kind: AiErrorKind,
        original_error: Option<String>,
    ) -> ChatOutcome {
        ChatOutcome {
            response: self.responder.respond(messages, Some(kind)),
            usage: None,
            service: "fallback",
            fallback: Some(FallbackInfo {
                kind,
                original_error,
            }),
        }
    }

    /// Probe the real provider with a minimal request
    ///
    /// Healthy iff the client is enabled and the probe did not fall back.
    pub async fn health_check(&self) -> Health {
        match &self.state {
            ClientState::Disabled { reason } => Health {
                healthy: false,
                reason: format!("disabled: {reason}"),
            },
            ClientState::Enabled(provider) => {
                let probe = [ChatMessage::new(Role::User, "ping")];
                let options = CompletionOptions {
                    max_tokens: Some(1),
                    temperature: Some(0.0),
                };
                let outcome = self.create_chat_completion(&probe, &options).await;
                if outcome.is_fallback() {
                    Health {
                        healthy: false,
                        reason: outcome
                            .fallback
                            .and_then(|f| f.original_error)
                            .unwrap_or_else(|| "probe fell back".to_string()),
                    }
                } else {
                    Health {
                        healthy: true,
                        reason: format!("{} reachable", provider.service),
                    }
                }
            }
        }
    }
}
