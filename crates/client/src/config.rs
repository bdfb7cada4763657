use serde::Deserialize;
use std::time::Duration;

use domain::services::SessionOptions;
use shared::validation::validate_profile_email;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
    /// Signed-in user profile
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the REST gateway, e.g. https://api.example.com
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_gateway_timeout_ms")]
    pub timeout_ms: u64,

    /// Static bearer token; absent means unauthenticated requests
    #[serde(default)]
    pub access_token: Option<String>,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line events, suited to a terminal.
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileConfig {
    /// Used to match the user against event guest lists
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Leave the invitation flow after declining, as after accepting
    #[serde(default)]
    pub exit_on_decline: bool,
}

// Default value functions
fn default_gateway_timeout_ms() -> u64 {
    30000
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with INBOX__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("INBOX").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds from embedded defaults so tests do not depend on config files.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [gateway]
            base_url = ""
            timeout_ms = 30000

            [logging]
            level = "info"
            format = "json"

            [profile]

            [session]
            exit_on_decline = false
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        let base_url = self.gateway.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "INBOX__GATEWAY__BASE_URL environment variable must be set".to_string(),
            ));
        }

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigValidationError::InvalidValue(format!(
                "gateway.base_url must be an http(s) URL, got {base_url}"
            )));
        }

        if self.gateway.timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Gateway timeout cannot be 0".to_string(),
            ));
        }

        if let Some(email) = self.profile_email() {
            validate_profile_email(email).map_err(|e| {
                ConfigValidationError::InvalidValue(
                    e.message.map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()),
                )
            })?;
        }

        Ok(())
    }

    /// Profile email, treating a blank value as absent.
    pub fn profile_email(&self) -> Option<&str> {
        self.profile
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            profile_email: self.profile_email().map(str::to_string),
            exit_on_decline: self.session.exit_on_decline,
        }
    }
}
