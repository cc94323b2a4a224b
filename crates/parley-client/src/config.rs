use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Idle window after which a typing indicator expires.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(2000);

/// How long a toast stays on screen.
pub const DEFAULT_NOTIFICATION_DURATION: Duration = Duration::from_millis(3000);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a number of milliseconds, got '{value}'")]
    InvalidMillis { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base, for example `https://chat.example.org/api`.
    pub api_url: String,
    /// WebSocket endpoint of the event channel.
    pub gateway_url: String,
    /// Login profile written by the auth flow.
    pub session_file: PathBuf,
    pub typing_timeout: Duration,
    pub notification_duration: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000/api".into(),
            gateway_url: "ws://localhost:5000/gateway".into(),
            session_file: PathBuf::from("session.json"),
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            notification_duration: DEFAULT_NOTIFICATION_DURATION,
        }
    }
}

impl ClientConfig {
    /// Read `PARLEY_*` variables, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let millis = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::InvalidMillis { key, value }),
            }
        };

        Ok(Self {
            api_url: lookup("PARLEY_API_URL")
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.api_url),
            gateway_url: lookup("PARLEY_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            session_file: lookup("PARLEY_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_file),
            typing_timeout: millis("PARLEY_TYPING_TIMEOUT_MS", defaults.typing_timeout)?,
            notification_duration: millis(
                "PARLEY_NOTIFICATION_DURATION_MS",
                defaults.notification_duration,
            )?,
        })
    }
}
