//! Configuration loading, validation, and management for quizpilot.
//!
//! Loads configuration from `~/.quizpilot/config.toml` with environment
//! variable overrides. The result is an immutable [`AppConfig`] built once at
//! startup and passed explicitly to the gateway and the agent loop.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.quizpilot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM provider (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM provider name ("gemini", "openai", "openrouter", "ollama", ...)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name passed to the provider
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per oracle response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Email reported to the quiz server with each submission
    #[serde(default)]
    pub email: String,

    /// Shared secret callers must present to `POST /quiz`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Root for per-run scratch directories
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub downloads: DownloadConfig,

    #[serde(default)]
    pub interpreter: InterpreterConfig,

    #[serde(default)]
    pub code_runner: CodeRunnerConfig,

    #[serde(default)]
    pub submit: SubmitConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("quizpilot")
}

const REDACTED: &str = "[REDACTED]";

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => REDACTED,
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("email", &self.email)
            .field("secret", &redact(&self.secret))
            .field("scratch_dir", &self.scratch_dir)
            .field("gateway", &self.gateway)
            .field("agent", &self.agent)
            .field("browser", &self.browser)
            .field("downloads", &self.downloads)
            .field("interpreter", &self.interpreter)
            .field("code_runner", &self.code_runner)
            .field("submit", &self.submit)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Entries kept by `GET /history` before the oldest is evicted
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    7860
}
fn default_history_limit() -> usize {
    100
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            history_limit: default_history_limit(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Oracle invocations allowed per run
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Token-bucket refill rate for LLM calls
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Token-bucket capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Per-request timeout for the LLM client
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,
}

fn default_max_steps() -> u32 {
    200
}
fn default_requests_per_minute() -> u32 {
    9
}
fn default_burst() -> u32 {
    9
}
fn default_llm_timeout() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            requests_per_minute: default_requests_per_minute(),
            burst: default_burst(),
            llm_timeout_secs: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Path to a Chrome/Chromium binary; auto-detected when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_executable: Option<PathBuf>,

    #[serde(default = "default_browser_timeout")]
    pub timeout_secs: u64,

    /// Extra wait after navigation so late XHR/JS can land
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_max_html_chars")]
    pub max_html_chars: usize,

    /// Pass `--no-sandbox` (needed when running as root in containers)
    #[serde(default = "default_true")]
    pub no_sandbox: bool,
}

fn default_browser_timeout() -> u64 {
    30
}
fn default_settle_ms() -> u64 {
    1000
}
fn default_max_html_chars() -> usize {
    100_000
}
fn default_true() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            timeout_secs: default_browser_timeout(),
            settle_ms: default_settle_ms(),
            max_html_chars: default_max_html_chars(),
            no_sandbox: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

fn default_download_timeout() -> u64 {
    60
}
fn default_max_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_download_timeout(),
            max_bytes: default_max_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    #[serde(default = "default_pdf_max_pages")]
    pub pdf_max_pages: usize,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_csv_preview_rows")]
    pub csv_preview_rows: usize,
}

fn default_pdf_max_pages() -> usize {
    5
}
fn default_max_chars() -> usize {
    4000
}
fn default_csv_preview_rows() -> usize {
    20
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            pdf_max_pages: default_pdf_max_pages(),
            max_chars: default_max_chars(),
            csv_preview_rows: default_csv_preview_rows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRunnerConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default = "default_code_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// Installer command line; package names are appended
    #[serde(default = "default_install_command")]
    pub install_command: String,

    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,
}

fn default_interpreter() -> String {
    "python3".into()
}
fn default_code_timeout() -> u64 {
    120
}
fn default_max_output_chars() -> usize {
    10_000
}
fn default_install_command() -> String {
    "python3 -m pip install".into()
}
fn default_install_timeout() -> u64 {
    300
}

impl Default for CodeRunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_secs: default_code_timeout(),
            max_output_chars: default_max_output_chars(),
            install_command: default_install_command(),
            install_timeout_secs: default_install_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConfig {
    #[serde(default = "default_submit_timeout")]
    pub timeout_secs: u64,
}

fn default_submit_timeout() -> u64 {
    30
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_submit_timeout(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.quizpilot/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`AppConfig::load`], but reads `path` when given.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::config_path();
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
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
        Ok(config)
    }

    /// Apply environment overrides. Variables win over the file.
    ///
    /// API key precedence: `QUIZPILOT_API_KEY`, then the vendor variables of
    /// the selected provider only (`GEMINI_API_KEY`/`GOOGLE_API_KEY` for
    /// gemini, `OPENAI_API_KEY` for openai).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = non_empty("QUIZPILOT_PROVIDER") {
            self.provider = provider;
        }
        if let Some(key) = std::iter::once("QUIZPILOT_API_KEY")
            .chain(provider_key_vars(&self.provider).iter().copied())
            .find_map(|k| non_empty(k))
        {
            self.api_key = Some(key);
        }
        if let Some(email) = non_empty("EMAIL") {
            self.email = email;
        }
        if let Some(secret) = non_empty("SECRET") {
            self.secret = Some(secret);
        }
        if let Some(model) = non_empty("QUIZPILOT_MODEL") {
            self.model = model;
        }
        if let Some(port) = non_empty("PORT") {
            self.gateway.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("PORT is not a valid port: {port}")))?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".quizpilot")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate ranges. Credentials are not required here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError("agent.max_steps must be > 0".into()));
        }
        if self.agent.requests_per_minute == 0 || self.agent.burst == 0 {
            return Err(ConfigError::ValidationError(
                "agent.requests_per_minute and agent.burst must be > 0".into(),
            ));
        }
        if self.interpreter.pdf_max_pages == 0 || self.interpreter.csv_preview_rows == 0 {
            return Err(ConfigError::ValidationError(
                "interpreter.pdf_max_pages and interpreter.csv_preview_rows must be > 0".into(),
            ));
        }
        if self.code_runner.interpreter.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "code_runner.interpreter must not be empty".into(),
            ));
        }
        if self.code_runner.install_command.split_whitespace().next().is_none() {
            return Err(ConfigError::ValidationError(
                "code_runner.install_command must not be empty".into(),
            ));
        }
        let timeouts = [
            ("browser.timeout_secs", self.browser.timeout_secs),
            ("downloads.timeout_secs", self.downloads.timeout_secs),
            ("code_runner.timeout_secs", self.code_runner.timeout_secs),
            ("code_runner.install_timeout_secs", self.code_runner.install_timeout_secs),
            ("submit.timeout_secs", self.submit.timeout_secs),
            ("agent.llm_timeout_secs", self.agent.llm_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::ValidationError(format!("{name} must be > 0")));
        }
        Ok(())
    }

    /// Everything `serve` needs: valid ranges plus a secret, an email and
    /// an API key for the selected provider.
    pub fn validate_for_serving(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.secret.as_deref().is_none_or(|s| s.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "secret is required (set SECRET or `secret` in config.toml)".into(),
            ));
        }
        if self.email.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "email is required (set EMAIL or `email` in config.toml)".into(),
            ));
        }
        if self.provider != "ollama" && self.api_key_for(&self.provider).is_none() {
            return Err(ConfigError::MissingApiKey(self.provider.clone()));
        }
        Ok(())
    }

    /// The API key for a provider: its own section first, then the root key.
    pub fn api_key_for(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.as_deref())
            .or(self.api_key.as_deref())
    }

    /// The model to request from a provider: its own section first, then the root model.
    pub fn model_for(&self, provider: &str) -> &str {
        self.providers
            .get(provider)
            .and_then(|p| p.model.as_deref())
            .unwrap_or(&self.model)
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key_for(&self.provider).is_some()
    }

    /// A copy with every credential replaced, safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let hide = |v: &mut Option<String>| {
            if v.is_some() {
                *v = Some(REDACTED.into());
            }
        };
        hide(&mut copy.api_key);
        hide(&mut copy.secret);
        for provider in copy.providers.values_mut() {
            hide(&mut provider.api_key);
        }
        copy
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Vendor environment variables that hold a key for `provider`.
fn provider_key_vars(provider: &str) -> &'static [&'static str] {
    match provider {
        "gemini" | "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        _ => &[],
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            email: String::new(),
            secret: None,
            scratch_dir: default_scratch_dir(),
            gateway: GatewayConfig::default(),
            agent: AgentConfig::default(),
            browser: BrowserConfig::default(),
            downloads: DownloadConfig::default(),
            interpreter: InterpreterConfig::default(),
            code_runner: CodeRunnerConfig::default(),
            submit: SubmitConfig::default(),
            providers: HashMap::new(),
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

    #[error("No API key configured for provider '{0}' (set QUIZPILOT_API_KEY or GEMINI_API_KEY)")]
    MissingApiKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    fn serving_config() -> AppConfig {
        AppConfig {
            api_key: Some("key".into()),
            email: "student@example.com".into(),
            secret: Some("s3cret".into()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "gemini");
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.gateway.port, 7860);
        assert_eq!(config.agent.max_steps, 200);
        assert_eq!(config.agent.requests_per_minute, 9);
        assert_eq!(config.interpreter.pdf_max_pages, 5);
        assert_eq!(config.interpreter.max_chars, 4000);
        assert_eq!(config.interpreter.csv_preview_rows, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider, config.provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.code_runner.install_command, config.code_runner.install_command);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
email = "student@example.com"

[agent]
max_steps = 12

[providers.openai]
api_url = "http://localhost:9999/v1"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.email, "student@example.com");
        assert_eq!(config.agent.max_steps, 12);
        assert_eq!(config.agent.burst, 9);
        assert_eq!(config.browser.timeout_secs, 30);
        assert_eq!(
            config.providers["openai"].api_url.as_deref(),
            Some("http://localhost:9999/v1")
        );
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "agent = [not toml").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_step_ceiling_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_steps = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider, "gemini");
    }

    #[test]
    fn env_overrides_win() {
        let mut config = AppConfig {
            email: "file@example.com".into(),
            ..AppConfig::default()
        };
        config
            .apply_env(env(&[
                ("GEMINI_API_KEY", "gem-key"),
                ("OPENAI_API_KEY", "oai-key"),
                ("EMAIL", "env@example.com"),
                ("SECRET", "env-secret"),
                ("QUIZPILOT_MODEL", "gemini-2.5-pro"),
                ("PORT", "8080"),
            ]))
            .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("gem-key"));
        assert_eq!(config.email, "env@example.com");
        assert_eq!(config.secret.as_deref(), Some("env-secret"));
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.provider, "gemini");
    }

    #[test]
    fn quizpilot_key_has_priority() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[("GOOGLE_API_KEY", "g"), ("QUIZPILOT_API_KEY", "q")]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("q"));
    }

    #[test]
    fn vendor_key_follows_selected_provider() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("GEMINI_API_KEY", "gem-key"),
                ("OPENAI_API_KEY", "oai-key"),
                ("QUIZPILOT_PROVIDER", "openai"),
            ]))
            .unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key.as_deref(), Some("oai-key"));

        let mut config = AppConfig {
            provider: "openai".into(),
            ..AppConfig::default()
        };
        config.apply_env(env(&[("GEMINI_API_KEY", "gem-key")])).unwrap();
        assert!(config.api_key.is_none());

        let mut config = AppConfig {
            provider: "ollama".into(),
            ..AppConfig::default()
        };
        config.apply_env(env(&[("OPENAI_API_KEY", "oai-key")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = AppConfig {
            email: "file@example.com".into(),
            ..AppConfig::default()
        };
        config.apply_env(env(&[("EMAIL", "   ")])).unwrap();
        assert_eq!(config.email, "file@example.com");
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env(&[("PORT", "seventy")])).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("PORT")));
    }

    #[test]
    fn serving_requires_credentials() {
        assert!(serving_config().validate_for_serving().is_ok());

        let no_secret = AppConfig { secret: None, ..serving_config() };
        assert!(matches!(no_secret.validate_for_serving(), Err(ConfigError::ValidationError(_))));

        let no_email = AppConfig { email: String::new(), ..serving_config() };
        assert!(matches!(no_email.validate_for_serving(), Err(ConfigError::ValidationError(_))));

        let no_key = AppConfig { api_key: None, ..serving_config() };
        assert!(matches!(no_key.validate_for_serving(), Err(ConfigError::MissingApiKey(p)) if p == "gemini"));
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = AppConfig {
            api_key: None,
            provider: "ollama".into(),
            ..serving_config()
        };
        assert!(config.validate_for_serving().is_ok());
    }

    #[test]
    fn provider_section_key_wins() {
        let mut config = AppConfig {
            api_key: Some("root".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("scoped".into()),
                ..ProviderConfig::default()
            },
        );
        assert_eq!(config.api_key_for("openai"), Some("scoped"));
        assert_eq!(config.api_key_for("gemini"), Some("root"));
    }

    #[test]
    fn debug_and_redacted_hide_credentials() {
        let config = serving_config();
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("\"key\""));
        assert!(debug.contains("[REDACTED]"));

        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini-2.5-flash"));
        assert!(toml_str.contains("7860"));
        assert!(toml_str.contains("[code_runner]"));
    }
}
