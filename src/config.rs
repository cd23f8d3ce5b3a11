//! Application-level configuration loading: overflow policy, notification
//! templates and the Telegram Bot API endpoint.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{services::distribution::OverflowPolicy, state::randomizer::Bucket};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COHORT_RANDOMIZER_CONFIG_PATH";
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_TABLE_MESSAGE: &str = "{title}: you are seated at table {table}.";
const DEFAULT_NUMBER_MESSAGE: &str = "{title}: your number is {number}.";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Behaviour of tables randomizers with more participants than seats.
    pub overflow_policy: OverflowPolicy,
    /// Texts sent to participants once a distribution is published.
    pub templates: MessageTemplates,
    /// Base URL of the Telegram Bot API.
    pub telegram_api_base: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Notification texts with `{title}`, `{table}` and `{number}` placeholders.
pub struct MessageTemplates {
    /// Used for tables randomizers.
    pub table_message: String,
    /// Used for simple (number draw) randomizers.
    pub number_message: String,
}

impl MessageTemplates {
    /// Render the message announcing `bucket` for the randomizer `title`.
    pub fn render(&self, title: &str, bucket: &Bucket) -> String {
        // Bucket first, so placeholders inside the title stay literal.
        let with_bucket = match bucket {
            Bucket::Table(table) => self.table_message.replace("{table}", &table.to_string()),
            Bucket::Number(number) => self.number_message.replace("{number}", &number.to_string()),
        };
        with_bucket.replace("{title}", title)
    }
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            table_message: DEFAULT_TABLE_MESSAGE.to_owned(),
            number_message: DEFAULT_NUMBER_MESSAGE.to_owned(),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        overflow_policy = ?app_config.overflow_policy,
                        "loaded application config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON configuration document. Missing keys take their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            overflow_policy: OverflowPolicy::default(),
            templates: MessageTemplates::default(),
            telegram_api_base: DEFAULT_TELEGRAM_API_BASE.to_owned(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    overflow_policy: OverflowPolicy,
    #[serde(default)]
    table_message: Option<String>,
    #[serde(default)]
    number_message: Option<String>,
    #[serde(default)]
    telegram_api_base: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = MessageTemplates::default();
        Self {
            overflow_policy: value.overflow_policy,
            templates: MessageTemplates {
                table_message: value.table_message.unwrap_or(defaults.table_message),
                number_message: value.number_message.unwrap_or(defaults.number_message),
            },
            telegram_api_base: value
                .telegram_api_base
                .map(|base| base.trim_end_matches('/').to_owned())
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_owned()),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
