//! Global configuration types for studyflow.
//!
//! `GlobalConfig` represents the top-level `config.toml` in the data
//! directory. Every section and field has a default, so an empty file (or no
//! file at all) yields a working configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration. Loaded from `~/.studyflow/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// OpenAI-compatible completion gateway used by `ai_task` steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    /// Model used when a step does not name one.
    #[serde(default = "default_ai_model")]
    pub default_model: String,
    /// Name of the environment variable holding the gateway API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Overrides the built-in default system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_ai_base_url() -> String {
    "https://ai.gateway.lovable.dev/v1".to_string()
}

fn default_ai_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "STUDYFLOW_AI_API_KEY".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            default_model: default_ai_model(),
            api_key_env: default_api_key_env(),
            system_prompt: None,
        }
    }
}

/// Timeouts applied by the step interpreter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Default timeout for `ai_task` and `api_call` steps.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    /// Default wall-clock budget for a whole run.
    #[serde(default = "default_workflow_timeout_secs")]
    pub workflow_timeout_secs: u64,
    /// Request timeout for the HTTP client behind `api_call`.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_workflow_timeout_secs() -> u64 {
    1800
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            workflow_timeout_secs: default_workflow_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler passes in daemon mode.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.ai.default_model, "google/gemini-2.5-flash");
        assert_eq!(config.execution.step_timeout_secs, 300);
        assert_eq!(config.execution.workflow_timeout_secs, 1800);
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_global_config_deserialize_empty() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.ai.api_key_env, "STUDYFLOW_AI_API_KEY");
        assert!(config.ai.system_prompt.is_none());
    }

    #[test]
    fn test_global_config_partial_sections() {
        let toml_str = r#"
[ai]
default_model = "openai/gpt-4o-mini"

[execution]
workflow_timeout_secs = 60
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ai.default_model, "openai/gpt-4o-mini");
        assert_eq!(config.ai.base_url, "https://ai.gateway.lovable.dev/v1");
        assert_eq!(config.execution.workflow_timeout_secs, 60);
        assert_eq!(config.execution.step_timeout_secs, 300);
        assert_eq!(config.server.host, "127.0.0.1");
    }
}
