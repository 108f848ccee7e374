//! Bootstrap configuration loading
//!
//! Configuration is resolved in priority order:
//! 1. Command-line arguments (applied by the binary via [`ConfigOverrides`])
//! 2. Environment variables (`MEALWISE_*`)
//! 3. TOML config file (explicit path, else the platform config directory)
//! 4. Compiled defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5780;

/// Complete bootstrap configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub fetch: FetchConfig,
    pub auth: AuthConfig,
    pub drafts: DraftConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("mealwise.db"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter directive (trace, debug, info, warn, error or a full EnvFilter string)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "mealwise_api=info,tower_http=info".to_string(),
        }
    }
}

/// OpenAI-compatible language model endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// API key; the assistant features are disabled when unset
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// Outbound HTML fetching limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_html_bytes: usize,
    pub max_redirects: usize,
    pub max_prompt_chars: usize,
    pub user_agent: String,
    /// Permit loopback/private targets. Only meant for local development and tests.
    pub allow_private_hosts: bool,
    pub allow_nonstandard_ports: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_html_bytes: 2 * 1024 * 1024,
            max_redirects: 5,
            max_prompt_chars: 24_000,
            user_agent: format!("Mealwise/{} (recipe importer)", env!("CARGO_PKG_VERSION")),
            allow_private_hosts: false,
            allow_nonstandard_ports: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { token_ttl_hours: 24 * 30 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DraftConfig {
    pub ttl_hours: i64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub port: Option<u16>,
}

impl TomlConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration following the documented priority order
    ///
    /// An explicit `path` that does not exist is an error; a missing default
    /// config file is not.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
                })?;
                info!("Loaded TOML configuration from {}", path.display());
                Self::from_toml_str(&content)?
            }
            None => match default_config_file() {
                Some(path) if path.exists() => {
                    let content = std::fs::read_to_string(&path)?;
                    info!("Loaded TOML configuration from {}", path.display());
                    Self::from_toml_str(&content)?
                }
                _ => {
                    info!("No config file found, using built-in defaults");
                    Self::default()
                }
            },
        };

        config.apply_env();
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply `MEALWISE_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("MEALWISE_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid MEALWISE_PORT value '{}'", port),
            }
        }
        if let Ok(host) = std::env::var("MEALWISE_HOST") {
            self.server.host = host;
        }
        if let Ok(path) = std::env::var("MEALWISE_DATABASE") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("MEALWISE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(key) = std::env::var("MEALWISE_LLM_API_KEY") {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("MEALWISE_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("MEALWISE_LLM_MODEL") {
            self.llm.model = model;
        }
    }

    /// Apply command-line overrides (highest priority)
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.database_path {
            self.database.path = path.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("server.port must be non-zero".to_string()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model must not be empty".to_string()));
        }
        if self.llm.timeout_secs == 0 || self.fetch.timeout_secs == 0 {
            return Err(Error::Config("timeouts must be at least 1 second".to_string()));
        }
        if self.fetch.max_html_bytes == 0 || self.fetch.max_prompt_chars == 0 {
            return Err(Error::Config("fetch limits must be non-zero".to_string()));
        }
        if self.auth.token_ttl_hours <= 0 || self.drafts.ttl_hours <= 0 {
            return Err(Error::Config("TTL values must be positive".to_string()));
        }
        Ok(())
    }
}

/// Platform config file location (`<config_dir>/mealwise/config.toml`)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mealwise").join("config.toml"))
}

/// Platform data directory used for the default database path
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mealwise"))
        .unwrap_or_else(|| PathBuf::from("./mealwise_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.llm.api_key.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [server]
            port = 9000

            [llm]
            model = "local-model"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.fetch.max_redirects, 5);
    }

    #[test]
    fn test_overrides_win() {
        let mut config = TomlConfig::default();
        config.apply_overrides(&ConfigOverrides {
            database_path: Some(PathBuf::from("/tmp/x.db")),
            port: Some(1234),
        });
        assert_eq!(config.server.port, 1234);
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = TomlConfig::default();
        config.server.port = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(TomlConfig::from_toml_str("server = [").is_err());
    }
}
