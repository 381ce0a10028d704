use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::checker::DEFAULT_FETCH_TIMEOUT;
use crate::services::notifier::SmtpConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Environment configuration
/// Loads and validates environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub access_password: Option<String>,
    pub public_base_url: Option<String>,
    pub smtp: Option<SmtpConfig>,
    /// Alert recipient for the `check` command
    pub email_to: Option<String>,
    pub fetch_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let smtp = SmtpConfig::from_parts(
            get("SMTP_HOST").unwrap_or_else(|| "smtp.mail.yahoo.com".to_string()),
            parse_or(get("SMTP_PORT"), "SMTP_PORT", 587)?,
            get("SMTP_USER"),
            get("SMTP_PASS"),
            get("EMAIL_FROM"),
        );

        let fetch_timeout = Duration::from_secs(parse_or(
            get("FETCH_TIMEOUT_SECS"),
            "FETCH_TIMEOUT_SECS",
            DEFAULT_FETCH_TIMEOUT.as_secs(),
        )?);
        let shutdown_grace =
            Duration::from_secs(parse_or(get("SHUTDOWN_GRACE_SECS"), "SHUTDOWN_GRACE_SECS", 20)?);

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            database_url: get("DATABASE_URL"),
            access_password: get("ACCESS_PASSWORD"),
            public_base_url: get("PUBLIC_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            smtp,
            email_to: get("EMAIL_TO").map(|to| to.trim().to_string()),
            fetch_timeout,
            shutdown_grace,
        })
    }
}

fn parse_or<T: FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
