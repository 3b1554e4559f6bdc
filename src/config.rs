//! Application configuration module
//! Handles environment variable loading and validation of process settings.
//! Money-affecting settings (routing, margins) live in [`crate::system_config`].

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::pricing::PricingError;
use crate::vending::types::ProviderId;
use crate::workers::scheduler::SchedulerConfig;

/// Upstream calls are abandoned after this long unless overridden.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 28;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` when running with `SKIP_EXTERNALS=true`.
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub provider_a: ProviderConfig,
    pub provider_b: ProviderConfig,
    pub scheduler: SchedulerConfig,
    pub settings_path: PathBuf,
    pub catalog_cache_ttl: Duration,
    pub skip_externals: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64, // seconds
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Credentials and endpoint for one upstream vending provider.
#[derive(Clone)]
pub struct ProviderConfig {
    pub provider: ProviderId,
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        let skip_externals = parse_bool("SKIP_EXTERNALS", false)?;
        let database = if skip_externals {
            None
        } else {
            Some(DatabaseConfig::from_env()?)
        };

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database,
            logging: LoggingConfig::from_env()?,
            provider_a: ProviderConfig::from_env(ProviderId::ProviderA)?,
            provider_b: ProviderConfig::from_env(ProviderId::ProviderB)?,
            scheduler: SchedulerConfig::from_env()?,
            settings_path: PathBuf::from(
                env::var("SYSTEM_SETTINGS_PATH")
                    .unwrap_or_else(|_| "config/system.toml".to_string()),
            ),
            catalog_cache_ttl: Duration::from_secs(parse_u64("CATALOG_CACHE_TTL_SECONDS", 300)?),
            skip_externals,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.provider_a.validate()?;
        self.provider_b.validate()?;

        self.scheduler.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_u64("DB_MAX_CONNECTIONS", 20)? as u32,
            min_connections: parse_u64("DB_MIN_CONNECTIONS", 5)? as u32,
            connection_timeout: parse_u64("DB_CONNECTION_TIMEOUT", 30)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }
        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "plain".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "plain" | "pretty" | "text" => LogFormat::Plain,
            _ => return Err(ConfigError::InvalidValue("LOG_FORMAT".to_string())),
        };
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }
        Ok(())
    }
}

impl ProviderConfig {
    fn env_prefix(provider: ProviderId) -> &'static str {
        match provider {
            ProviderId::ProviderA => "PROVIDER_A",
            ProviderId::ProviderB => "PROVIDER_B",
        }
    }

    /// Reads `<PREFIX>_BASE_URL`, `<PREFIX>_API_KEY` and `<PREFIX>_TIMEOUT_SECS`.
    /// Credentials are never defaulted.
    pub fn from_env(provider: ProviderId) -> Result<Self, ConfigError> {
        let prefix = Self::env_prefix(provider);
        let base_url_key = format!("{}_BASE_URL", prefix);
        let api_key_key = format!("{}_API_KEY", prefix);
        let timeout_key = format!("{}_TIMEOUT_SECS", prefix);

        let base_url = env::var(&base_url_key)
            .map_err(|_| ConfigError::MissingVariable(base_url_key.clone()))?;
        let api_key =
            env::var(&api_key_key).map_err(|_| ConfigError::MissingVariable(api_key_key.clone()))?;
        let timeout = parse_u64(&timeout_key, DEFAULT_PROVIDER_TIMEOUT_SECS)?;

        Ok(ProviderConfig {
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(timeout),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = Self::env_prefix(self.provider);
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingVariable(format!("{}_API_KEY", prefix)));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(format!(
                "{}_BASE_URL must be a valid URL",
                prefix
            )));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(format!("{}_TIMEOUT_SECS", prefix)));
        }
        Ok(())
    }
}

fn parse_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    parse_u64_value(key, env::var(key).ok().as_deref(), default)
}

fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    parse_bool_value(key, env::var(key).ok().as_deref(), default)
}

/// Parses `raw` when present. Anything unparsable is an error naming `key`.
pub(crate) fn parse_u64_value(key: &str, raw: Option<&str>, default: u64) -> Result<u64, ConfigError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

pub(crate) fn parse_bool_value(
    key: &str,
    raw: Option<&str>,
    default: bool,
) -> Result<bool, ConfigError> {
    match raw {
        Some(raw) => parse_flag(raw).ok_or_else(|| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Failed to load system settings: {0}")]
    Settings(String),

    #[error("Invalid margin configuration: {0}")]
    Margins(#[from] PricingError),
}

impl From<::config::ConfigError> for ConfigError {
    fn from(err: ::config::ConfigError) -> Self {
        ConfigError::Settings(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderConfig {
        ProviderConfig {
            provider: ProviderId::ProviderA,
            base_url: "https://vendor.example.com/api".to_string(),
            api_key: "secret".to_string(),
            timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };
        assert!(config.validate().is_ok());

        let config = ServerConfig {
            host: "".to_string(),
            port: 8000,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_pool_bounds() {
        let config = DatabaseConfig {
            url: "postgres://localhost/vendora".to_string(),
            max_connections: 5,
            min_connections: 10,
            connection_timeout: 30,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_config_requires_key_and_url() {
        assert!(provider().validate().is_ok());

        let mut missing_key = provider();
        missing_key.api_key = "  ".to_string();
        assert!(matches!(
            missing_key.validate(),
            Err(ConfigError::MissingVariable(key)) if key == "PROVIDER_A_API_KEY"
        ));

        let mut bad_url = provider();
        bad_url.base_url = "vendor.example.com".to_string();
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn test_provider_config_debug_hides_key() {
        let rendered = format!("{:?}", provider());
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_flag_parsing() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
