//! Configuration types.
//!
//! Everything is read from environment variables. Each `from_env()` has a
//! `from_lookup()` twin that takes the variable source as a closure, so the
//! parsing rules can be exercised without touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Free-mail providers rejected as work email domains unless overridden.
pub const DEFAULT_FREE_MAIL_DOMAINS: &[&str] =
    &["gmail.com", "hotmail.com", "yahoo.com", "outlook.com"];

/// HTTP server and storage settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/signups.db"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match lookup("WIZARD_PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "WIZARD_PORT".to_string(),
                message: format!("{e}"),
            })?,
            None => defaults.port,
        };

        let db_path = lookup("WIZARD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        Ok(Self { port, db_path })
    }
}

/// Wizard behaviour settings.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Domains rejected for the work email field (lower-case).
    pub free_mail_domains: Vec<String>,
    /// Sessions idle for longer than this are discarded.
    pub session_idle_timeout: Duration,
    /// Lifetime of an issued verification code.
    pub code_ttl: Duration,
    /// Wrong guesses allowed before an issued code is burned.
    pub max_code_attempts: u32,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            free_mail_domains: DEFAULT_FREE_MAIL_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            session_idle_timeout: Duration::from_secs(30 * 60),
            code_ttl: Duration::from_secs(10 * 60),
            max_code_attempts: 5,
        }
    }
}

impl WizardConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let free_mail_domains = lookup("WIZARD_FREE_MAIL_DOMAINS")
            .map(|raw| parse_domain_list(&raw))
            .unwrap_or(defaults.free_mail_domains);

        let session_idle_timeout = lookup("WIZARD_SESSION_IDLE_MIN")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .and_then(minutes)
            .unwrap_or(defaults.session_idle_timeout);

        let code_ttl = lookup("WIZARD_CODE_TTL_MIN")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .and_then(minutes)
            .unwrap_or(defaults.code_ttl);

        let max_code_attempts = lookup("WIZARD_CODE_MAX_ATTEMPTS")
            .and_then(|s| s.trim().parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_code_attempts);

        Self {
            free_mail_domains,
            session_idle_timeout,
            code_ttl,
            max_code_attempts,
        }
    }
}

/// Minutes to a `Duration`; `None` on overflow.
fn minutes(m: u64) -> Option<Duration> {
    m.checked_mul(60).map(Duration::from_secs)
}

fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('@').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
