//! Configuration loading and validation for agentloom.
//!
//! Loads configuration from `~/.agentloom/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use agentloom_core::AgentDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentloom/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default chat provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Executor and strategy tuning
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Remote tool services, keyed by service name
    #[serde(default)]
    pub mcp: BTreeMap<String, McpServiceConfig>,

    /// Agent definitions served by the in-memory agent store
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("gateway", &self.gateway)
            .field("runtime", &self.runtime)
            .field("providers", &self.providers)
            .field("mcp", &self.mcp)
            .field("agents", &self.agents.iter().map(|a| &a.id).collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Executor and strategy tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Capacity of the per-run event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Step budget for react, chain, es and sql agents
    #[serde(default = "default_max_steps")]
    pub default_max_steps: usize,

    /// Step budget for plan agents
    #[serde(default = "default_plan_max_steps")]
    pub plan_max_steps: usize,

    #[serde(default = "default_true")]
    pub enable_replan: bool,

    #[serde(default = "default_max_replans")]
    pub max_replans: usize,

    /// Characters of a step result kept in memory and summaries
    #[serde(default = "default_preview_chars")]
    pub result_preview_chars: usize,
}

fn default_event_buffer() -> usize {
    10
}
fn default_max_steps() -> usize {
    10
}
fn default_plan_max_steps() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_max_replans() -> usize {
    3
}
fn default_preview_chars() -> usize {
    200
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            default_max_steps: default_max_steps(),
            plan_max_steps: default_plan_max_steps(),
            enable_replan: true,
            max_replans: default_max_replans(),
            result_preview_chars: default_preview_chars(),
        }
    }
}

/// How to reach a remote tool service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Http,
    Stdio,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServiceConfig {
    #[serde(default)]
    pub transport: McpTransportKind,

    /// URL for http, program path for stdio
    pub endpoint: String,

    /// Command-line arguments (stdio only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra environment for the child process (stdio only)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Request headers sent with every call (http only)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentloom/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path` and apply environment overrides.
    ///
    /// - `AGENTLOOM_API_KEY`, then `OPENAI_API_KEY`, when no key is configured
    /// - `AGENTLOOM_PROVIDER`
    /// - `AGENTLOOM_MODEL`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = var("AGENTLOOM_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }

        if let Some(provider) = var("AGENTLOOM_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = var("AGENTLOOM_MODEL") {
            self.default_model = model;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            agents = config.agents.len(),
            mcp_services = config.mcp.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentloom")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.runtime.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.event_buffer must be > 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate agent id: {}",
                    agent.id
                )));
            }
        }

        for (name, service) in &self.mcp {
            if service.endpoint.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "mcp.{name}.endpoint must not be empty"
                )));
            }
            if service.transport == McpTransportKind::Stdio && !service.headers.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "mcp.{name}.headers only applies to http services"
                )));
            }
        }

        Ok(())
    }

    /// The API key for `provider`: its own entry first, then the global key.
    pub fn api_key_for(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.as_deref())
            .or(self.api_key.as_deref())
    }

    /// Check if an API key is available for the default provider.
    pub fn has_api_key(&self) -> bool {
        self.api_key_for(&self.default_provider).is_some()
    }

    /// Fail with a configuration error when no chat credentials are present.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.has_api_key() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredentials(self.default_provider.clone()))
        }
    }

    /// Step budget for a framework when the agent does not set one.
    pub fn max_steps_for(&self, framework: agentloom_core::Framework) -> usize {
        match framework {
            agentloom_core::Framework::Plan => self.runtime.plan_max_steps,
            _ => self.runtime.default_max_steps,
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            gateway: GatewayConfig::default(),
            runtime: RuntimeConfig::default(),
            providers: HashMap::new(),
            mcp: BTreeMap::new(),
            agents: Vec::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("No API key configured for provider '{0}'. Set AGENTLOOM_API_KEY or api_key in config.toml")]
    MissingCredentials(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloom_core::Framework;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.runtime.event_buffer, 10);
        assert_eq!(config.runtime.max_replans, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_event_buffer_rejected() {
        let mut config = AppConfig::default();
        config.runtime.event_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_agents_rejected() {
        let config = AppConfig {
            agents: vec![
                AgentDefinition::new("a", Framework::React),
                AgentDefinition::new("a", Framework::Plan),
            ],
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate agent id: a"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn loads_agents_and_mcp_services() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
api_key = "sk-test"
default_model = "gpt-4o"

[runtime]
enable_replan = false

[mcp.vm]
endpoint = "http://localhost:9000/mcp"
headers = {{ Authorization = "Bearer t0ken" }}

[mcp.files]
transport = "stdio"
endpoint = "mcp-files"
args = ["--root", "/tmp"]
env = {{ FILES_ROOT = "/tmp" }}

[[agents]]
id = "dog"
name = "Dog expert"
framework = "react"
mcp_services = ["vm"]

[[agents]]
id = "planner"
name = "Planner"
framework = "plan"
config = {{ enable_replan = true, max_replans = 1 }}
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert!(!config.runtime.enable_replan);
        assert_eq!(config.runtime.plan_max_steps, 50);
        assert_eq!(config.mcp["vm"].transport, McpTransportKind::Http);
        assert_eq!(config.mcp["files"].transport, McpTransportKind::Stdio);
        assert_eq!(config.mcp["files"].args, ["--root", "/tmp"]);
        assert_eq!(config.mcp["vm"].headers["Authorization"], "Bearer t0ken");
        assert!(config.mcp["vm"].env.is_empty());
        assert_eq!(config.mcp["files"].env["FILES_ROOT"], "/tmp");
        assert!(config.mcp["files"].headers.is_empty());
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[1].framework, Framework::Plan);
        assert_eq!(config.agents[1].config["max_replans"], 1);
        assert!(config.has_api_key());
    }

    #[test]
    fn empty_mcp_endpoint_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[mcp.vm]\nendpoint = \"  \"\n").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn headers_on_stdio_service_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[mcp.files]\ntransport = \"stdio\"\nendpoint = \"mcp-files\"\nheaders = {{ X-Token = \"t\" }}\n"
        )
        .unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("mcp.files.headers")));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "default_model = [").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            "OPENAI_API_KEY" => Some("sk-env".into()),
            "AGENTLOOM_MODEL" => Some("gpt-4.1".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.default_model, "gpt-4.1");
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn configured_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        config.apply_overrides(|_| Some("sk-env".into()));
        assert_eq!(config.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn provider_key_preferred() {
        let mut config = AppConfig::default();
        assert!(config.require_credentials().is_err());
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-provider".into()),
                ..Default::default()
            },
        );
        config.api_key = Some("sk-global".into());
        assert_eq!(config.api_key_for("openai"), Some("sk-provider"));
        assert_eq!(config.api_key_for("other"), Some("sk-global"));
        assert!(config.require_credentials().is_ok());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn plan_budget_differs() {
        let config = AppConfig::default();
        assert_eq!(config.max_steps_for(Framework::Plan), 50);
        assert_eq!(config.max_steps_for(Framework::Sql), 10);
    }
}
