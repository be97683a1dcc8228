use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for FormAgent
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// AI provider configuration
    #[serde(default)]
    pub ai: AiConfig,
    /// Conversation memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Content guardrails configuration
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
    /// Assistant personality configuration
    #[serde(default)]
    pub personality: PersonalityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8730")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8730".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// AI provider configuration
///
/// Supports two provider variants: a direct OpenAI-compatible API
/// (`provider = "openai"`) and an Azure-style hosted deployment
/// (`provider = "azure"`). API keys are read from the environment,
/// never from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Whether the AI backend is enabled at all
    #[serde(default = "default_ai_enabled")]
    pub enabled: bool,
    /// Provider type: "openai" or "azure"
    #[serde(default = "default_ai_provider")]
    pub provider: String,
    /// Base URL for OpenAI-compatible APIs
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    /// Endpoint URL for Azure deployments
    #[serde(default)]
    pub endpoint: String,
    /// Deployment name for Azure deployments
    #[serde(default)]
    pub deployment: String,
    /// API version query parameter for Azure deployments
    #[serde(default = "default_ai_api_version")]
    pub api_version: String,
    /// Model identifier sent to OpenAI-compatible APIs
    #[serde(default = "default_ai_model")]
    pub model: String,
    /// Environment variable name for the API key
    #[serde(default = "default_ai_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in seconds
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum completion tokens per request
    #[serde(default = "default_ai_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_ai_temperature")]
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: default_ai_enabled(),
            provider: default_ai_provider(),
            base_url: default_ai_base_url(),
            endpoint: String::new(),
            deployment: String::new(),
            api_version: default_ai_api_version(),
            model: default_ai_model(),
            api_key_env: default_ai_api_key_env(),
            timeout_secs: default_ai_timeout_secs(),
            max_tokens: default_ai_max_tokens(),
            temperature: default_ai_temperature(),
        }
    }
}

fn default_ai_enabled() -> bool {
    true
}

fn default_ai_provider() -> String {
    "openai".to_string()
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_api_version() -> String {
    "2024-02-15-preview".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    30
}

fn default_ai_max_tokens() -> u32 {
    1024
}

fn default_ai_temperature() -> f32 {
    0.7
}

/// Conversation memory configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Maximum messages kept in short-term memory per conversation
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Maximum characters stored per message content
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// Maximum characters kept in the long-term summary
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,
    /// Maximum previously created forms remembered per conversation
    #[serde(default = "default_max_form_history")]
    pub max_form_history: usize,
    /// Token budget for assembled conversation context
    #[serde(default = "default_context_max_tokens")]
    pub context_max_tokens: usize,
    /// Seconds of inactivity before a cache entry is evicted
    #[serde(default = "default_cache_idle_secs")]
    pub cache_idle_secs: u64,
    /// Seconds of inactivity before a conversation is archived
    #[serde(default = "default_archive_after_secs")]
    pub archive_after_secs: u64,
    /// Interval between background maintenance sweeps
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
    /// Persist conversations to disk (false = in-memory only)
    #[serde(default)]
    pub persist: bool,
    /// Base directory for persisted conversation documents
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_content_chars: default_max_content_chars(),
            max_summary_chars: default_max_summary_chars(),
            max_form_history: default_max_form_history(),
            context_max_tokens: default_context_max_tokens(),
            cache_idle_secs: default_cache_idle_secs(),
            archive_after_secs: default_archive_after_secs(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            persist: false,
            data_dir: default_data_dir(),
        }
    }
}

fn default_max_messages() -> usize {
    20
}

fn default_max_content_chars() -> usize {
    4000
}

fn default_max_summary_chars() -> usize {
    2000
}

fn default_max_form_history() -> usize {
    10
}

fn default_context_max_tokens() -> usize {
    2000
}

fn default_cache_idle_secs() -> u64 {
    1800
}

fn default_archive_after_secs() -> u64 {
    604_800
}

fn default_maintenance_interval_secs() -> u64 {
    300
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".formagent"))
        .unwrap_or_else(|| PathBuf::from(".formagent"))
}

/// Content guardrails configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailsConfig {
    /// Maximum fields allowed on a single form
    #[serde(default = "default_max_form_fields")]
    pub max_form_fields: usize,
    /// Responses shorter than this are padded with a generic expansion
    #[serde(default = "default_min_response_chars")]
    pub min_response_chars: usize,
    /// Maximum retained violation log entries (oldest dropped beyond this)
    #[serde(default = "default_violation_log_capacity")]
    pub violation_log_capacity: usize,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            max_form_fields: default_max_form_fields(),
            min_response_chars: default_min_response_chars(),
            violation_log_capacity: default_violation_log_capacity(),
        }
    }
}

fn default_max_form_fields() -> usize {
    50
}

fn default_min_response_chars() -> usize {
    20
}

fn default_violation_log_capacity() -> usize {
    1000
}

/// Assistant personality configuration, merged into conversation context
#[derive(Debug, Clone, Deserialize)]
pub struct PersonalityConfig {
    /// Name the assistant introduces itself with
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    /// Primary response language
    #[serde(default = "default_language")]
    pub language: String,
    /// Overall tone hint passed to the model
    #[serde(default = "default_tone")]
    pub tone: String,
    /// Extra behavioral guidelines appended to the system prompt
    #[serde(default)]
    pub guidelines: Vec<String>,
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            language: default_language(),
            tone: default_tone(),
            guidelines: Vec::new(),
        }
    }
}

fn default_assistant_name() -> String {
    "FormAgent".to_string()
}

fn default_language() -> String {
    "vi".to_string()
}

fn default_tone() -> String {
    "friendly".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8730");
        assert_eq!(config.server.request_timeout_secs, 60);
        assert!(config.ai.enabled);
        assert_eq!(config.ai.provider, "openai");
        assert_eq!(config.ai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.memory.max_messages, 20);
        assert_eq!(config.memory.max_form_history, 10);
        assert!(!config.memory.persist);
        assert_eq!(config.guardrails.max_form_fields, 50);
        assert_eq!(config.guardrails.violation_log_capacity, 1000);
        assert_eq!(config.personality.assistant_name, "FormAgent");
        assert_eq!(config.personality.language, "vi");
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[server]
listen_addr = "0.0.0.0:8080"
request_timeout_secs = 30

[ai]
provider = "azure"
endpoint = "https://example.openai.azure.com"
deployment = "gpt-4o"
api_key_env = "AZURE_OPENAI_KEY"
timeout_secs = 20

[memory]
max_messages = 10
cache_idle_secs = 600
archive_after_secs = 86400
persist = true
data_dir = "/tmp/formagent"

[guardrails]
max_form_fields = 25

[personality]
assistant_name = "TrinhAI"
guidelines = ["Always answer in Vietnamese"]
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.ai.provider, "azure");
        assert_eq!(config.ai.endpoint, "https://example.openai.azure.com");
        assert_eq!(config.ai.deployment, "gpt-4o");
        assert_eq!(config.ai.api_key_env, "AZURE_OPENAI_KEY");
        assert_eq!(config.ai.timeout_secs, 20);
        assert_eq!(config.memory.max_messages, 10);
        assert_eq!(config.memory.cache_idle_secs, 600);
        assert_eq!(config.memory.archive_after_secs, 86400);
        assert!(config.memory.persist);
        assert_eq!(config.memory.data_dir, PathBuf::from("/tmp/formagent"));
        assert_eq!(config.guardrails.max_form_fields, 25);
        assert_eq!(config.personality.assistant_name, "TrinhAI");
        assert_eq!(config.personality.guidelines.len(), 1);
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[ai]
enabled = false
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse partial TOML");

        assert!(!config.ai.enabled);
        // Defaults fill everything else
        assert_eq!(config.ai.model, "gpt-4o-mini");
        assert_eq!(config.memory.max_messages, 20);
        assert_eq!(config.server.listen_addr, "127.0.0.1:8730");
    }

    #[test]
    fn test_archive_window_longer_than_cache_idle_by_default() {
        let config = Config::default();
        assert!(config.memory.archive_after_secs > config.memory.cache_idle_secs);
    }
}
