use crate::errors::{Error, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub live_url: String,
    pub fetch_timeout: Duration,
    pub poll_interval: Duration,
    pub cooldown_window: Duration,
    /// Sweep stale cooldown entries every this many ticks; 0 disables.
    pub cooldown_sweep_every: u64,
    pub temp_threshold_c: f64,
    pub http_addr: String,
    pub mail: MailConfig,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub recipient: Option<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Everything except the database location has a default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| Error::Config("DATABASE_URL must be set".to_string()))?;

        Ok(Self {
            database_url,
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), 5),
            live_url: get("LIVE_URL").unwrap_or_else(|| "http://localhost:8090/live".to_string()),
            fetch_timeout: Duration::from_secs(parse_or(get("FETCH_TIMEOUT_SECS"), 10)),
            poll_interval: Duration::from_secs(parse_or(get("POLL_INTERVAL_SECS"), 3)),
            cooldown_window: Duration::from_secs(parse_or(get("COOLDOWN_SECS"), 300)),
            cooldown_sweep_every: parse_or(get("COOLDOWN_SWEEP_EVERY"), 1000),
            temp_threshold_c: parse_or(get("TEMP_C_THRESHOLD"), 70.0),
            http_addr: get("HTTP_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            mail: MailConfig {
                username: get("ALERT_EMAIL"),
                password: get("ALERT_PASS"),
                recipient: get("ALERT_TARGET"),
                smtp_host: get("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                smtp_port: parse_or(get("SMTP_PORT"), 465),
            },
        })
    }

    /// Database URL with credentials stripped, for logging.
    pub fn redacted_database_url(&self) -> &str {
        self.database_url.split('@').last().unwrap_or("***")
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
