//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use vp_core::ValidationError;

/// Business timezone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "Europe/Brussels";

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// IANA name of the timezone dates and local times refer to.
    pub timezone: String,
    /// Calendar imported by `vp import`.
    pub calendar_id: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_refresh_token: Option<String>,
    /// Claude API key used by `vp raw structure`.
    pub api_key: Option<String>,
    pub model: String,
    /// Employee id the CLI acts as for admin-only commands.
    pub operator_id: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("timezone", &self.timezone)
            .field("calendar_id", &self.calendar_id)
            .field("google_client_id", &self.google_client_id)
            .field("google_client_secret", &redact(&self.google_client_secret))
            .field("google_refresh_token", &redact(&self.google_refresh_token))
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("operator_id", &self.operator_id)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("vp.db"),
            timezone: DEFAULT_TIMEZONE.to_string(),
            calendar_id: None,
            google_client_id: None,
            google_client_secret: None,
            google_refresh_token: None,
            api_key: None,
            model: vp_llm::DEFAULT_MODEL.to_string(),
            operator_id: None,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // VP_DATABASE_PATH, VP_API_KEY, ...
        figment = figment.merge(Env::prefixed("VP_"));

        figment.extract()
    }

    /// The configured business timezone.
    pub fn tz(&self) -> Result<Tz, ValidationError> {
        self.timezone
            .trim()
            .parse()
            .map_err(|_| ValidationError::UnknownValue {
                field: "timezone",
                value: self.timezone.clone(),
            })
    }
}

/// Returns the platform-specific config directory for vp.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("vp"))
}

/// Returns the platform-specific data directory for vp.
///
/// On Linux: `~/.local/share/vp`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("vp"))
}
