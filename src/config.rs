use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const CONFIG_DIR: &str = "config";
const FALLBACK_RUN_ENV: &str = "development";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const WEAK_SECRET_FRAGMENTS: [&str; 3] = ["changeme", "password", "your-secret-key"];

/// Settings for the food-ordering server, merged from TOML layers and
/// `APP__*` variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub database_url: String,

    pub host: String,

    #[serde(default = "defaults::port")]
    pub port: u16,

    /// `development`, `production`, or any name with a matching TOML file.
    #[validate(length(min = 1))]
    pub environment: String,

    #[serde(default = "defaults::log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit one JSON object per log line
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub auto_migrate: bool,

    /// Insert the default navigation menu on startup when the menu table is empty
    #[serde(default)]
    pub seed_reference_data: bool,

    /// Account that receives every seeded menu
    #[serde(default)]
    pub seed_admin_email: Option<String>,

    #[serde(default = "defaults::pool_max")]
    pub db_max_connections: u32,
    #[serde(default = "defaults::pool_min")]
    pub db_min_connections: u32,
    #[serde(default = "defaults::connect_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "defaults::idle_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "defaults::acquire_secs")]
    pub db_acquire_timeout_secs: u64,

    /// HS256 secret used to verify bearer tokens
    #[validate(custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Expected `iss` claim
    #[serde(default = "defaults::jwt_issuer")]
    pub jwt_issuer: String,

    /// Expected `aud` claim
    #[serde(default = "defaults::jwt_audience")]
    pub jwt_audience: String,

    /// Lifetime of tokens minted by [`crate::auth::AuthService::issue_token`]
    #[serde(default = "defaults::jwt_expiration_secs")]
    #[validate(range(min = 60))]
    pub jwt_expiration_secs: u64,

    /// Page size used when a list request omits `per_page`
    #[serde(default = "defaults::page_size")]
    #[validate(range(min = 1))]
    pub api_default_page_size: u64,

    /// Upper bound applied to any requested `per_page`
    #[serde(default = "defaults::max_page_size")]
    #[validate(range(min = 1))]
    pub api_max_page_size: u64,

    /// Number of orders shown in dashboard "recent orders" panels
    #[serde(default = "defaults::recent_orders")]
    #[validate(range(min = 1, max = 100))]
    pub dashboard_recent_orders: u64,

    /// Catalog search compares name/category with exact case when true
    #[serde(default)]
    pub catalog_search_case_sensitive: bool,

    /// Reject backwards order status moves (Delivered -> Pending etc.)
    #[serde(default)]
    pub enforce_status_transitions: bool,

    /// Comma separated origins for the CORS layer
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Outside development, answer any origin when none are listed
    #[serde(default)]
    pub cors_allow_any_origin: bool,
}

impl AppConfig {
    /// Builds a configuration from the values that have no sensible default;
    /// everything else takes the same value an empty TOML file would give.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: defaults::log_level(),
            log_json: false,
            auto_migrate: false,
            seed_reference_data: false,
            seed_admin_email: None,
            db_max_connections: defaults::pool_max(),
            db_min_connections: defaults::pool_min(),
            db_connect_timeout_secs: defaults::connect_secs(),
            db_idle_timeout_secs: defaults::idle_secs(),
            db_acquire_timeout_secs: defaults::acquire_secs(),
            jwt_secret,
            jwt_issuer: defaults::jwt_issuer(),
            jwt_audience: defaults::jwt_audience(),
            jwt_expiration_secs: defaults::jwt_expiration_secs(),
            api_default_page_size: defaults::page_size(),
            api_max_page_size: defaults::max_page_size(),
            dashboard_recent_orders: defaults::recent_orders(),
            catalog_search_case_sensitive: false,
            enforce_status_transitions: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(FALLBACK_RUN_ENV)
    }

    /// Non-empty, trimmed entries of `cors_allowed_origins`.
    pub fn cors_origins(&self) -> Vec<&str> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .collect()
    }

    /// Whether a missing origin list may fall back to `CorsLayer::permissive`.
    pub fn permits_any_origin(&self) -> bool {
        self.cors_allow_any_origin || self.is_development()
    }

    /// Clamps a requested page size into `1..=api_max_page_size`, falling back
    /// to the default when none was requested.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.api_default_page_size)
            .clamp(1, self.api_max_page_size)
    }

    /// Rules that span more than one field.
    fn check_cross_field_rules(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.api_max_page_size < self.api_default_page_size {
            errors.add(
                "api_max_page_size",
                invalid(
                    "api_max_page_size",
                    "api_max_page_size must not be smaller than api_default_page_size",
                ),
            );
        }

        if self.cors_origins().is_empty() && !self.permits_any_origin() {
            errors.add(
                "cors_allowed_origins",
                invalid(
                    "cors_origins_missing",
                    "list origins in APP__CORS_ALLOWED_ORIGINS or set APP__CORS_ALLOW_ANY_ORIGIN=true",
                ),
            );
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("could not read configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration is invalid: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

mod defaults {
    pub(super) fn port() -> u16 {
        8080
    }
    pub(super) fn log_level() -> String {
        "info".to_string()
    }
    pub(super) fn pool_max() -> u32 {
        16
    }
    pub(super) fn pool_min() -> u32 {
        2
    }
    pub(super) fn connect_secs() -> u64 {
        30
    }
    pub(super) fn idle_secs() -> u64 {
        600
    }
    pub(super) fn acquire_secs() -> u64 {
        8
    }
    pub(super) fn jwt_issuer() -> String {
        "food-ordering-api".to_string()
    }
    pub(super) fn jwt_audience() -> String {
        "food-ordering-clients".to_string()
    }
    pub(super) fn jwt_expiration_secs() -> u64 {
        3600
    }
    pub(super) fn page_size() -> u64 {
        10
    }
    pub(super) fn max_page_size() -> u64 {
        100
    }
    pub(super) fn recent_orders() -> u64 {
        10
    }
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(invalid("log_level", "expected trace, debug, info, warn or error"))
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let secret = secret.trim();

    if secret.len() < 32 {
        return Err(invalid("jwt_secret", "token secret needs at least 32 characters"));
    }

    let mut chars = secret.chars();
    if let Some(first) = chars.next() {
        if chars.all(|c| c == first) {
            return Err(invalid("jwt_secret", "token secret is a single repeated character"));
        }
    }

    let lowered = secret.to_ascii_lowercase();
    if WEAK_SECRET_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
    {
        return Err(invalid(
            "jwt_secret",
            "token secret contains a well-known placeholder; generate a random one",
        ));
    }

    Ok(())
}

/// Installs the global `fmt` subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let directives = match env::var("RUST_LOG") {
        Ok(value) if !value.trim().is_empty() => value,
        _ => format!("food_ordering_api={level},tower_http=debug"),
    };

    let builder = fmt().with_env_filter(directives);
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Reads `config/default.toml`, then `config/{RUN_ENV}.toml`, then `APP__*`
/// variables, each layer overriding the previous one.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] but reads the TOML layers from `config_dir`.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| FALLBACK_RUN_ENV.to_string());
    info!(environment = %run_env, "Loading configuration");

    if !config_dir.is_dir() {
        info!(
            dir = %config_dir.display(),
            "No configuration directory; using defaults and APP__ variables"
        );
    }

    // jwt_secret deliberately has no default.
    let layered = Config::builder()
        .set_default("database_url", "sqlite://food_ordering.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(defaults::port()))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", defaults::log_level())?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if layered.get_string("jwt_secret").is_err() {
        error!("APP__JWT_SECRET is not set");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret (set APP__JWT_SECRET)".into(),
        )));
    }

    let app_config: AppConfig = layered.try_deserialize()?;
    app_config
        .validate()
        .and_then(|()| app_config.check_cross_field_rules())
        .map_err(|errors| {
            error!(?errors, "Rejected configuration");
            AppConfigError::Validation(errors)
        })?;

    info!(environment = %app_config.environment, "Configuration ready");
    Ok(app_config)
}
