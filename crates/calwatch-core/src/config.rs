use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "CALWATCH_CONFIG";

/// Prefix for environment overrides, e.g. `CALWATCH_GOOGLE__DOMAIN=example.com`.
pub const ENV_PREFIX: &str = "CALWATCH";

/// Route the provider calls for calendar event notifications.
pub const EVENTS_ROUTE: &str = "/watch/events";

/// Route the provider calls for directory (user) notifications.
pub const USERS_ROUTE: &str = "/watch/users";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub google: GoogleConfig,

    /// Channel (watch subscription) lease settings
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Event dedup cache settings
    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Static account list; bypasses the directory listing at startup when non-empty
    #[serde(default)]
    pub accounts: AccountsConfig,

    /// Optional meeting-link observer
    #[serde(default)]
    pub meeting_links: Option<MeetingLinksConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Public base URL the provider delivers webhooks to
    #[serde(default)]
    pub receiving_url: String,

    /// Path to the service account JSON key
    #[serde(default)]
    pub service_account_key: PathBuf,

    /// Admin account impersonated for directory and calendar access
    #[serde(default)]
    pub admin_subject: Option<String>,

    /// Directory scoping: either a domain or a customer id is required
    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub customer: Option<String>,

    #[serde(default = "default_calendar_api_base")]
    pub calendar_api_base: String,

    #[serde(default = "default_directory_api_base")]
    pub directory_api_base: String,
}

fn default_calendar_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_directory_api_base() -> String {
    "https://admin.googleapis.com/admin/directory/v1".to_string()
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            receiving_url: String::new(),
            service_account_key: PathBuf::new(),
            admin_subject: None,
            domain: None,
            customer: None,
            calendar_api_base: default_calendar_api_base(),
            directory_api_base: default_directory_api_base(),
        }
    }
}

impl GoogleConfig {
    /// Receiving URL with any trailing slash removed.
    pub fn receiving_base(&self) -> String {
        normalize_url(&self.receiving_url)
    }

    /// Webhook address registered for event channels.
    pub fn events_webhook_url(&self) -> String {
        format!("{}{}", self.receiving_base(), EVENTS_ROUTE)
    }

    /// Webhook address registered for the directory channel.
    pub fn users_webhook_url(&self) -> String {
        format!("{}{}", self.receiving_base(), USERS_ROUTE)
    }
}

/// Strip one trailing `/` so derived routes never contain `//`.
pub fn normalize_url(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Requested lease length in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// How long before expiry a lease is replaced
    #[serde(default = "default_renewal_margin_secs")]
    pub renewal_margin_secs: u64,

    #[serde(default = "default_create_max_attempts")]
    pub create_max_attempts: u32,

    #[serde(default = "default_create_initial_delay_ms")]
    pub create_initial_delay_ms: u64,

    #[serde(default = "default_create_max_delay_ms")]
    pub create_max_delay_ms: u64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_ttl_secs() -> u64 {
    7200
}

fn default_renewal_margin_secs() -> u64 {
    5
}

fn default_create_max_attempts() -> u32 {
    5
}

fn default_create_initial_delay_ms() -> u64 {
    500
}

fn default_create_max_delay_ms() -> u64 {
    8000
}

fn default_true() -> bool {
    true
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            renewal_margin_secs: default_renewal_margin_secs(),
            create_max_attempts: default_create_max_attempts(),
            create_initial_delay_ms: default_create_initial_delay_ms(),
            create_max_delay_ms: default_create_max_delay_ms(),
            jitter: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_dedup_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_dedup_ttl_secs() -> u64 {
    30
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_dedup_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    config_dir().join("channels.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsConfig {
    #[serde(default)]
    pub whitelist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingLinksConfig {
    /// Marker in the event summary that opts a meeting in, e.g. `@webex`
    #[serde(default = "default_meeting_tag")]
    pub tag: String,

    /// Conferencing site the personal room lives on
    pub site: String,

    #[serde(default = "default_meeting_color_id")]
    pub color_id: String,
}

fn default_meeting_tag() -> String {
    "@webex".to_string()
}

fn default_meeting_color_id() -> String {
    "9".to_string()
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("calwatch")
}

impl Config {
    /// Load configuration from `$CALWATCH_CONFIG` or the default config path,
    /// layered under `CALWATCH_*` environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir().join("config.toml"));
        Self::load_from(&path)
    }

    /// Load configuration from a specific file (which may be absent) plus the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("accounts.whitelist")
                    .try_parsing(true),
            )
            .build()
            .map_err(ConfigError::from)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(ConfigError::from)
            .context("Failed to parse config")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors; warnings are logged.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.google.receiving_url.is_empty() {
            result.add_error("google.receiving_url", "Receiving URL is not defined");
        } else {
            self.validate_url(&self.google.receiving_url, "google.receiving_url", &mut result);
        }
        self.validate_url(
            &self.google.calendar_api_base,
            "google.calendar_api_base",
            &mut result,
        );
        self.validate_url(
            &self.google.directory_api_base,
            "google.directory_api_base",
            &mut result,
        );

        if self.google.domain.is_none() && self.google.customer.is_none() {
            result.add_error("google.domain", "Either a domain or a customer must be set");
        }

        if self.google.service_account_key.as_os_str().is_empty() {
            result.add_error(
                "google.service_account_key",
                "Service account key path is not defined",
            );
        } else if !self.google.service_account_key.exists() {
            result.add_warning(
                "google.service_account_key",
                format!(
                    "Key file does not exist: {}",
                    self.google.service_account_key.display()
                ),
            );
        }

        if self.google.admin_subject.is_none() {
            result.add_warning(
                "google.admin_subject",
                "No admin subject set - directory calls will likely be rejected",
            );
        }

        if self.channels.ttl_secs == 0 {
            result.add_error("channels.ttl_secs", "Channel TTL must be greater than 0");
        } else if self.channels.ttl_secs <= self.channels.renewal_margin_secs {
            result.add_error(
                "channels.ttl_secs",
                "Channel TTL must exceed the renewal margin",
            );
        } else if self.channels.ttl_secs > 604_800 {
            result.add_warning(
                "channels.ttl_secs",
                "Channel TTL above 7 days will be capped by the provider",
            );
        }

        if self.channels.create_max_attempts == 0 {
            result.add_error(
                "channels.create_max_attempts",
                "At least one creation attempt is required",
            );
        }

        if self.dedup.ttl_secs == 0 {
            result.add_warning("dedup.ttl_secs", "Dedup cache disabled (0 seconds)");
        }

        if let Some(links) = &self.meeting_links {
            if links.tag.trim().is_empty() {
                result.add_error("meeting_links.tag", "Tag must not be empty");
            }
            if links.site.trim().is_empty() {
                result.add_error("meeting_links.site", "Site must not be empty");
            }
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if let Some(port) = url.port() {
                    if port == 0 {
                        result.add_error(field_name, "Port cannot be 0");
                    }
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }
}
