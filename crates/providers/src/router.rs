//! Provider router: selects the chat provider named by configuration.

use agentloom_config::{AppConfig, ConfigError};
use agentloom_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

use crate::openai_compat::OpenAiCompatProvider;

/// Routes chat requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
///
/// Fails when the default provider has no API key; every other configured
/// provider without a key is skipped with a warning.
pub fn build_from_config(config: &AppConfig) -> Result<ProviderRouter, ConfigError> {
    config.require_credentials()?;
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let Some(api_key) = config.api_key_for(name) else {
            tracing::warn!(provider = %name, "Skipping provider without API key");
            continue;
        };

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        let model = provider_config
            .default_model
            .clone()
            .unwrap_or_else(|| config.default_model.clone());

        let provider = OpenAiCompatProvider::new(name, base_url, api_key).with_default_model(model);
        router.register(name.clone(), Arc::new(provider));
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key_for(&config.default_provider).unwrap_or_default();
        let provider = OpenAiCompatProvider::new(
            &config.default_provider,
            default_base_url(&config.default_provider),
            api_key,
        )
        .with_default_model(&config.default_model);
        router.register(config.default_provider.clone(), Arc::new(provider));
    }

    tracing::debug!(providers = ?router.list(), default = %config.default_provider, "Built provider router");
    Ok(router)
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloom_config::ProviderConfig;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openai");
        router.register("openai", Arc::new(OpenAiCompatProvider::openai("sk-test")));

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn missing_credentials_is_config_error() {
        let config = AppConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ConfigError::MissingCredentials(p) if p == "openai"));
    }

    #[test]
    fn builds_default_and_configured_providers() {
        let mut config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "ollama".into(),
            ProviderConfig {
                api_url: Some("http://gpu-box:11434/v1".into()),
                default_model: Some("llama3".into()),
                ..Default::default()
            },
        );
        let router = build_from_config(&config).unwrap();
        assert_eq!(router.list(), vec!["ollama", "openai"]);
        assert_eq!(router.get("ollama").unwrap().default_model(), "llama3");
        assert_eq!(router.default().unwrap().default_model(), "gpt-4o-mini");
    }
}
