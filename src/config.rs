//! Configuration system for the news agent service
//!
//! Configuration is read once at startup from an optional TOML file, checked
//! eagerly, and then handed to components by value. Nothing reads the
//! environment after startup except through the accessors on [`AppConfig`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default locations searched when no config file is given on the command line
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["news-agent.toml", "config/news-agent.toml"];

/// Supported LLM provider identifiers
pub const SUPPORTED_PROVIDERS: &[&str] = &["ollama", "openai"];

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub scrape: ScrapeSection,
    #[serde(default)]
    pub crew: CrewSection,
    #[serde(default)]
    pub budget: BudgetConfig,
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on pipeline runs executing at the same time
    #[serde(default = "default_max_concurrent_pipelines")]
    pub max_concurrent_pipelines: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_pipelines: default_max_concurrent_pipelines(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_concurrent_pipelines() -> usize {
    4
}

/// LLM section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name ("ollama" or "openai")
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of the chat completions API, without the `/chat/completions` suffix
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Environment variable containing the API key (required for openai)
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_llm_base_url(),
            api_key_env: None,
            temperature: Some(0.2),
            max_tokens: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    300
}

/// Search tool section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSection {
    /// Environment variable containing the Tavily API key
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    /// Hard cap on results returned per search call
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_key_env: default_search_api_key_env(),
            base_url: default_search_base_url(),
            max_results: default_max_results(),
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_search_api_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_search_base_url() -> String {
    "https://api.tavily.com".to_string()
}

fn default_max_results() -> usize {
    2
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// Scrape tool section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeSection {
    /// Largest response body accepted, in bytes
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,
    /// Extracted text is cut to this many characters before reaching the LLM
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            max_response_size: default_max_response_size(),
            max_content_chars: default_max_content_chars(),
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_max_response_size() -> usize {
    2 * 1024 * 1024
}

fn default_max_content_chars() -> usize {
    12_000
}

/// Crew (pipeline) section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrewSection {
    /// Number of articles the research step keeps
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    /// Extra attempts granted to an agent whose output failed to parse
    #[serde(default = "default_max_parse_retries")]
    pub max_parse_retries: u32,
}

impl Default for CrewSection {
    fn default() -> Self {
        Self {
            max_articles: default_max_articles(),
            max_parse_retries: default_max_parse_retries(),
        }
    }
}

fn default_max_articles() -> usize {
    2
}

fn default_max_parse_retries() -> u32 {
    1
}

/// Budget configuration for tool calls and iterations, per agent step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    /// Maximum number of tool calls per step
    pub max_tool_calls: u32,
    /// Maximum number of LLM round trips per step
    pub max_iterations: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: 10,
            max_iterations: 8,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the first default path that exists,
    /// else built-in defaults. `HOST` and `PORT` override the server section.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::find_default_file() {
                Some(found) => Self::load_from_file(&found)?,
                None => Self::default(),
            },
        };

        config.apply_env_overrides(
            std::env::var("HOST").ok(),
            std::env::var("PORT").ok(),
        )?;
        config.validate()?;
        Ok(config)
    }

    fn find_default_file() -> Option<PathBuf> {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Apply host/port overrides (pure apart from mutation of self)
    fn apply_env_overrides(
        &mut self,
        host: Option<String>,
        port: Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port.trim().parse().map_err(|_| {
                ConfigError::InvalidConfig(format!("PORT '{port}' is not a valid port number"))
            })?;
        }
        Ok(())
    }

    /// Check value ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.server.max_concurrent_pipelines == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.max_concurrent_pipelines must be at least 1".to_string(),
            ));
        }
        if !SUPPORTED_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Unsupported LLM provider '{}', expected one of {:?}",
                self.llm.provider, SUPPORTED_PROVIDERS
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "llm.model must not be empty".to_string(),
            ));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "llm.base_url must not be empty".to_string(),
            ));
        }
        if self.llm.provider == "openai" && self.llm.api_key_env.is_none() {
            return Err(ConfigError::InvalidConfig(
                "llm.api_key_env is required for the openai provider".to_string(),
            ));
        }
        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidConfig(format!(
                    "llm.temperature {temperature} is outside 0.0..=2.0"
                )));
            }
        }
        if !(1..=20).contains(&self.search.max_results) {
            return Err(ConfigError::InvalidConfig(format!(
                "search.max_results {} is outside 1..=20",
                self.search.max_results
            )));
        }
        if self.crew.max_articles == 0 {
            return Err(ConfigError::InvalidConfig(
                "crew.max_articles must be at least 1".to_string(),
            ));
        }
        if self.budget.max_iterations == 0 {
            return Err(ConfigError::InvalidConfig(
                "budget.max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Search API key; a missing key is fatal at startup
    pub fn get_search_api_key(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.search.api_key_env)
    }

    /// LLM API key. Optional for ollama, required when `api_key_env` is set.
    pub fn get_llm_api_key(&self) -> Result<Option<String>, ConfigError> {
        match &self.llm.api_key_env {
            Some(name) => Self::get_env_var_required(name).map(Some),
            None => Ok(None),
        }
    }

    /// Socket address string for the HTTP server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[llm]
provider = "ollama"
model = "test-model"
base_url = "http://localhost:11434/v1"

[search]
api_key_env = "TEST_TAVILY_API_KEY"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "llama3.2:3b");
        assert_eq!(config.search.api_key_env, "TAVILY_API_KEY");
        assert_eq!(config.search.max_results, 2);
        assert_eq!(config.crew.max_articles, 2);
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[server]
host = "127.0.0.1"
port = 9000
max_concurrent_pipelines = 2

[llm]
provider = "openai"
model = "gpt-4o-mini"
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
temperature = 0.5
max_tokens = 1000
timeout_secs = 60

[search]
max_results = 3

[scrape]
max_content_chars = 500

[crew]
max_articles = 3
max_parse_retries = 2

[budget]
max_iterations = 4
max_tool_calls = 6
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.server.max_concurrent_pipelines, 2);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.temperature, Some(0.5));
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.scrape.max_content_chars, 500);
        assert_eq!(config.crew.max_parse_retries, 2);
        assert_eq!(config.budget.max_tool_calls, 6);
    }

    #[test]
    fn test_unsupported_provider_rejected() {
        let result = AppConfig::from_toml_str("[llm]\nprovider = \"mystery\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_openai_requires_api_key_env() {
        let result = AppConfig::from_toml_str("[llm]\nprovider = \"openai\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_max_results_bounds() {
        let zero = AppConfig::from_toml_str("[search]\nmax_results = 0\n");
        assert!(zero.is_err());

        let too_many = AppConfig::from_toml_str("[search]\nmax_results = 21\n");
        assert!(too_many.is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = AppConfig::from_toml_str("[server]\nmax_concurrent_pipelines = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_temperature_out_of_range() {
        let result = AppConfig::from_toml_str("[llm]\ntemperature = 3.5\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(Some("127.0.0.1".to_string()), Some("8123".to_string()))
            .unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8123");

        let bad = config.apply_env_overrides(None, Some("not-a-port".to_string()));
        assert!(matches!(bad, Err(ConfigError::InvalidConfig(_))));

        // Blank host is ignored
        config
            .apply_env_overrides(Some("  ".to_string()), None)
            .unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_missing_search_key_is_error() {
        let mut config = AppConfig::test_config();
        config.search.api_key_env = "NEWS_AGENT_TEST_KEY_THAT_IS_NEVER_SET".to_string();

        let result = config.get_search_api_key();
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound(name)) if name == "NEWS_AGENT_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_llm_api_key_optional_for_ollama() {
        let config = AppConfig::test_config();
        assert_eq!(config.get_llm_api_key().unwrap(), None);
    }
}
