use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_DATABASE_URL: &str = "sqlite://stockroom.db?mode=rwc";
const CONFIG_DIR: &str = "config";
const DEFAULT_SUMMARY_DAYS: u32 = 30;
const DEFAULT_TRANSACTION_LIMIT: u64 = 100;
const DEFAULT_PARTS_PAGE_SIZE: u64 = 50;
const DEFAULT_COUNT_PREFIX: &str = "SC";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// What the ledger does when a movement would take on-hand below zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeStockPolicy {
    /// Floor the balance at zero and keep the raw delta in the log.
    #[default]
    Clamp,
    /// Refuse the movement with `InsufficientStock`.
    Reject,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Clamp (default) or reject movements that would go negative
    #[serde(default)]
    pub negative_stock_policy: NegativeStockPolicy,

    /// Trailing window for transaction summaries
    #[serde(default = "default_transaction_summary_days")]
    #[validate(range(min = 1, max = 3650))]
    pub transaction_summary_days: u32,

    /// Default row limit for transaction listings
    #[serde(default = "default_transaction_list_limit")]
    #[validate(range(min = 1, max = 10000))]
    pub transaction_list_limit: u64,

    /// Default page size for part listings
    #[serde(default = "default_parts_page_size")]
    #[validate(range(min = 1, max = 1000))]
    pub parts_page_size: u64,

    /// Prefix of generated stock count numbers
    #[serde(default = "default_count_number_prefix")]
    #[validate(length(min = 1, max = 8))]
    pub count_number_prefix: String,

    /// Offset applied to the date embedded in count numbers
    #[serde(default)]
    #[validate(custom = "validate_utc_offset_hours")]
    pub utc_offset_hours: i32,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Creates a configuration with every tunable at its default.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            negative_stock_policy: NegativeStockPolicy::default(),
            transaction_summary_days: default_transaction_summary_days(),
            transaction_list_limit: default_transaction_list_limit(),
            parts_page_size: default_parts_page_size(),
            count_number_prefix: default_count_number_prefix(),
            utc_offset_hours: 0,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_transaction_summary_days() -> u32 {
    DEFAULT_SUMMARY_DAYS
}
fn default_transaction_list_limit() -> u64 {
    DEFAULT_TRANSACTION_LIMIT
}
fn default_parts_page_size() -> u64 {
    DEFAULT_PARTS_PAGE_SIZE
}
fn default_count_number_prefix() -> String {
    DEFAULT_COUNT_PREFIX.to_string()
}
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_utc_offset_hours(hours: i32) -> Result<(), ValidationError> {
    if !(-12..=14).contains(&hours) {
        let mut err = ValidationError::new("utc_offset_hours");
        err.message = Some("utc_offset_hours must be between -12 and 14".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stockroom={},sea_orm=warn,sqlx=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

fn profile_path(config_dir: &Path, profile: &str) -> String {
    config_dir.join(profile).to_string_lossy().into_owned()
}

/// Loads application configuration from the `config/` directory.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (`{dir}/default.toml`)
/// 3. Environment-specific config (`{dir}/{env}.toml`)
/// 4. Environment variables (`APP__*`)
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&profile_path(config_dir, "default")).required(false))
        .add_source(File::with_name(&profile_path(config_dir, &run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_profile(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(format!("{name}.toml")), content).unwrap();
    }

    #[test]
    fn defaults_validate() {
        let cfg = AppConfig::new("sqlite::memory:".into(), "development".into());
        assert!(cfg.validate().is_ok());
        assert!(cfg.is_development());
        assert_eq!(cfg.negative_stock_policy, NegativeStockPolicy::Clamp);
        assert_eq!(cfg.transaction_summary_days, 30);
        assert_eq!(cfg.transaction_list_limit, 100);
        assert_eq!(cfg.count_number_prefix, "SC");
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "test".into());
        cfg.log_level = "verbose".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("log_level"));
    }

    #[test]
    fn rejects_zero_summary_window_and_channel() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "test".into());
        cfg.transaction_summary_days = 0;
        cfg.event_channel_capacity = 0;
        cfg.utc_offset_hours = 20;
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("transaction_summary_days"));
        assert!(errors.field_errors().contains_key("event_channel_capacity"));
        assert!(errors.field_errors().contains_key("utc_offset_hours"));
    }

    #[test]
    fn loads_default_profile_from_directory() {
        let dir = TempDir::new().unwrap();
        write_profile(
            &dir,
            "default",
            r#"
                database_url = "sqlite://inventory-test.db?mode=rwc"
                negative_stock_policy = "reject"
                count_number_prefix = "INV"
                utc_offset_hours = 8
            "#,
        );

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.database_url, "sqlite://inventory-test.db?mode=rwc");
        assert_eq!(cfg.negative_stock_policy, NegativeStockPolicy::Reject);
        assert_eq!(cfg.count_number_prefix, "INV");
        assert_eq!(cfg.utc_offset_hours, 8);
        assert_eq!(cfg.parts_page_size, 50);
    }

    #[test]
    fn invalid_profile_fails_validation() {
        let dir = TempDir::new().unwrap();
        write_profile(&dir, "default", "log_level = \"loud\"\n");

        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_profile(&dir, "default", "jwt_secret = \"nope\"\n");

        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(AppConfigError::Load(_))));
    }
}
