//! Provider router: selects the oracle backend based on config.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use quizpilot_core::provider::Provider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::rate_limit::RateLimitedProvider;

/// Routes LLM requests to the correct provider.
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

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Build providers from configuration.
///
/// Every provider is wrapped in its own token bucket, so all runs sharing a
/// provider share its request budget.
pub fn build_from_config(config: &quizpilot_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.provider);

    let mut names: Vec<&String> = config.providers.keys().collect();
    if !config.providers.contains_key(&config.provider) {
        names.push(&config.provider);
    }

    for name in names {
        let base_url = config
            .providers
            .get(name)
            .and_then(|p| p.api_url.clone())
            .unwrap_or_else(|| default_base_url(name));
        let api_key = config.api_key_for(name).unwrap_or_default();

        let client = OpenAiCompatProvider::new(name.as_str(), base_url, api_key)
            .with_timeout(Duration::from_secs(config.agent.llm_timeout_secs));
        let provider: Arc<dyn Provider> = Arc::new(RateLimitedProvider::new(
            Arc::new(client),
            config.agent.requests_per_minute,
            config.agent.burst,
        ));

        router.register(name.clone(), provider);
    }

    router
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "gemini" | "google" => "https://generativelanguage.googleapis.com/v1beta/openai".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizpilot_config::{AppConfig, ProviderConfig};

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("gemini");
        router.register("gemini", Arc::new(OpenAiCompatProvider::gemini("key")));

        assert!(router.get("gemini").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("gemini").contains("generativelanguage.googleapis.com"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let router = build_from_config(&config);
        let provider = router.default().unwrap();
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn configured_sections_are_registered() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "ollama".into(),
            ProviderConfig {
                api_url: Some("http://127.0.0.1:11434/v1".into()),
                model: Some("qwen2.5".into()),
                ..ProviderConfig::default()
            },
        );
        let router = build_from_config(&config);
        let mut names = router.list();
        names.sort();
        assert_eq!(names, vec!["gemini", "ollama"]);
        assert_eq!(config.model_for("ollama"), "qwen2.5");
        assert_eq!(config.model_for("gemini"), "gemini-2.5-flash");
    }
}
