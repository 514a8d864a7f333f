use crate::model::{ModelName, UnknownModelName};
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scoring: ScoringConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scoring: ScoringConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Reference data location and scoring defaults.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Directory holding the reference CSV tables; the bundled sample is used when unset.
    pub data_dir: Option<PathBuf>,
    pub default_model: ModelName,
    pub filter_claims: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_model: ModelName::CmsHccV28,
            filter_claims: true,
        }
    }
}

impl ScoringConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let data_dir = env::var("HCC_DATA_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let default_model = match env::var("HCC_DEFAULT_MODEL") {
            Ok(value) if !value.trim().is_empty() => {
                ModelName::parse(&value).map_err(|source| ConfigError::InvalidModel { source })?
            }
            _ => defaults.default_model,
        };

        let filter_claims = match env::var("HCC_FILTER_CLAIMS") {
            Ok(value) => parse_flag(&value).ok_or(ConfigError::InvalidFlag {
                name: "HCC_FILTER_CLAIMS",
                value,
            })?,
            Err(_) => defaults.filter_claims,
        };

        Ok(Self {
            data_dir,
            default_model,
            filter_claims,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidModel { source: UnknownModelName },
    InvalidFlag { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidModel { source } => {
                write!(f, "HCC_DEFAULT_MODEL is not a recognised model: {source}")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be true or false, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidFlag { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidModel { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("HCC_DATA_DIR");
        env::remove_var("HCC_DEFAULT_MODEL");
        env::remove_var("HCC_FILTER_CLAIMS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.scoring.data_dir, None);
        assert_eq!(config.scoring.default_model, ModelName::CmsHccV28);
        assert!(config.scoring.filter_claims);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn reads_scoring_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HCC_DATA_DIR", "/srv/hcc");
        env::set_var("HCC_DEFAULT_MODEL", "cms-hcc model v24");
        env::set_var("HCC_FILTER_CLAIMS", "off");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.scoring.data_dir, Some(PathBuf::from("/srv/hcc")));
        assert_eq!(config.scoring.default_model, ModelName::CmsHccV24);
        assert!(!config.scoring.filter_claims);
        reset_env();
    }

    #[test]
    fn rejects_unknown_default_model_and_bad_flags() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HCC_DEFAULT_MODEL", "HCC V99");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidModel { .. })
        ));

        reset_env();
        env::set_var("HCC_FILTER_CLAIMS", "maybe");
        let err = AppConfig::load().expect_err("flag rejected");
        assert_eq!(err.to_string(), "HCC_FILTER_CLAIMS must be true or false, got 'maybe'");
        reset_env();
    }
}
