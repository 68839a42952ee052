use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_REFUND_WINDOW_DAYS: i64 = 30;
const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CURRENCY: &str = "USD";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_env")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Days after order creation during which refunds may be requested
    #[validate(range(min = 1, max = 365))]
    #[serde(default = "default_refund_window_days")]
    pub refund_window_days: i64,

    /// Timeout budget for catalog/stock/payment collaborator calls
    #[validate(range(min = 1, max = 120))]
    #[serde(default = "default_collaborator_timeout_secs")]
    pub collaborator_timeout_secs: u64,

    /// Currency used when a cart does not specify one
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_env() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_refund_window_days() -> i64 {
    DEFAULT_REFUND_WINDOW_DAYS
}

fn default_collaborator_timeout_secs() -> u64 {
    DEFAULT_COLLABORATOR_TIMEOUT_SECS
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl AppConfig {
    /// Builds a configuration from explicit values. Used by tests and tools
    /// that do not want file/environment layering.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            refund_window_days: default_refund_window_days(),
            collaborator_timeout_secs: default_collaborator_timeout_secs(),
            default_currency: default_currency(),
        }
    }

    /// Loads configuration from layered sources: `config/default`, then
    /// `config/{environment}`, then `APP_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder()
            .set_default("environment", environment.clone())?;

        let default_path = Path::new(CONFIG_DIR).join("default");
        builder = builder.add_source(File::from(default_path).required(false));

        let env_path = Path::new(CONFIG_DIR).join(&environment);
        builder = builder.add_source(File::from(env_path).required(false));

        builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

        let config: AppConfig = builder.build()?.try_deserialize()?;

        config
            .validate()
            .map_err(|e| ConfigError::Message(format!("Invalid configuration: {}", e)))?;

        info!(
            environment = %config.environment,
            host = %config.host,
            port = config.port,
            "Configuration loaded"
        );

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Refund eligibility window measured from order creation time.
    pub fn refund_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.refund_window_days)
    }

    /// Timeout budget applied to every collaborator call.
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
