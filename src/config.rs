use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{key}={value:?} is not valid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Limits and clocks for the live connection core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealtimeConfig {
    pub max_message_bytes: usize,
    pub read_deadline: Duration,
    pub write_deadline: Duration,
    pub ping_period: Duration,
    pub mailbox_capacity: usize,
    pub history_limit: u32,
    pub max_content_bytes: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 1 << 20,
            read_deadline: Duration::from_secs(60),
            write_deadline: Duration::from_secs(10),
            ping_period: Duration::from_secs(54),
            mailbox_capacity: 256,
            history_limit: 50,
            max_content_bytes: 4000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    pub cors_allow_credentials: bool,
    pub channel_api_base: Option<String>,
    pub realtime: RealtimeConfig,
    pub room_idle_timeout: Duration,
    /// `None` disables the idle room reaper.
    pub room_reap_interval: Option<Duration>,
}

impl Config {
    /// Reads the process environment, honouring a `.env` file.
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let cors_origins = match get("CORS_ORIGINS") {
            Some(origins) => origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_owned)
                .collect(),
            None => vec!["*".to_owned()],
        };

        let defaults = RealtimeConfig::default();
        let realtime = RealtimeConfig {
            max_message_bytes: number(&get, "WS_MAX_MESSAGE_BYTES", defaults.max_message_bytes)?,
            read_deadline: seconds(&get, "WS_READ_DEADLINE_SECS", defaults.read_deadline)?,
            write_deadline: seconds(&get, "WS_WRITE_DEADLINE_SECS", defaults.write_deadline)?,
            ping_period: seconds(&get, "WS_PING_PERIOD_SECS", defaults.ping_period)?,
            mailbox_capacity: number(&get, "WS_MAILBOX_CAPACITY", defaults.mailbox_capacity)?,
            history_limit: number(&get, "CHAT_HISTORY_LIMIT", defaults.history_limit)?,
            max_content_bytes: number(&get, "CHAT_MAX_CONTENT_BYTES", defaults.max_content_bytes)?,
        };

        if realtime.ping_period.is_zero() || realtime.ping_period >= realtime.read_deadline {
            return Err(ConfigError::Invalid {
                key: "WS_PING_PERIOD_SECS",
                value: realtime.ping_period.as_secs().to_string(),
                reason: "must be non-zero and shorter than WS_READ_DEADLINE_SECS",
            });
        }
        if realtime.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "WS_MAILBOX_CAPACITY",
                value: "0".to_owned(),
                reason: "must be at least 1",
            });
        }
        if realtime.max_content_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "CHAT_MAX_CONTENT_BYTES",
                value: "0".to_owned(),
                reason: "must be at least 1",
            });
        }

        let reap_interval = seconds(&get, "ROOM_REAP_INTERVAL_SECS", Duration::from_secs(60))?;

        Ok(Config {
            server_addr: get("SERVER_ADDR").unwrap_or_else(|| "localhost:8001".to_owned()),
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite://chat.db".to_owned()),
            jwt_secret,
            cors_origins,
            cors_allow_credentials: get("CORS_ALLOW_CREDENTIALS")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            channel_api_base: get("CHANNEL_API_BASE").map(|b| b.trim_end_matches('/').to_owned()),
            realtime,
            room_idle_timeout: seconds(&get, "ROOM_IDLE_TIMEOUT_SECS", Duration::from_secs(600))?,
            room_reap_interval: (!reap_interval.is_zero()).then_some(reap_interval),
        })
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

fn number<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key,
            value,
            reason: "expected a non-negative integer",
        }),
        None => Ok(default),
    }
}

const MAX_SECONDS: u64 = 24 * 60 * 60;

fn seconds(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs = number(get, key, default.as_secs())?;
    if secs > MAX_SECONDS {
        return Err(ConfigError::Invalid {
            key,
            value: secs.to_string(),
            reason: "must be at most one day",
        });
    }
    Ok(Duration::from_secs(secs))
}
