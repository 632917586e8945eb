//! Verification code delivery: SMTP via lettre, or the log for development.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ConfigError, GateError};

/// Delivers an issued code to an address.
#[async_trait]
pub trait CodeMailer: Send + Sync {
    async fn deliver(&self, to: &str, code: &str) -> Result<(), GateError>;
}

// ── Configuration ───────────────────────────────────────────────────

/// SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Returns `Ok(None)` if `SMTP_HOST` is not set (SMTP disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let Some(host) = lookup("SMTP_HOST") else {
            return Ok(None);
        };

        let port: u16 = lookup("SMTP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = lookup("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(lookup("SMTP_PASSWORD").unwrap_or_default());
        let from_address = lookup("SMTP_FROM_ADDRESS")
            .or_else(|| (!username.is_empty()).then(|| username.clone()))
            .ok_or_else(|| ConfigError::MissingEnvVar("SMTP_FROM_ADDRESS".to_string()))?;

        Ok(Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        }))
    }
}

// ── SMTP ────────────────────────────────────────────────────────────

/// Sends codes through an SMTP relay.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn send_blocking(config: &SmtpConfig, email: Message) -> Result<(), GateError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| GateError::SendFailed(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(creds)
            .build();

        transport
            .send(&email)
            .map_err(|e| GateError::SendFailed(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl CodeMailer for SmtpMailer {
    async fn deliver(&self, to: &str, code: &str) -> Result<(), GateError> {
        let email = build_code_message(&self.config.from_address, to, code)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || Self::send_blocking(&config, email))
            .await
            .map_err(|e| GateError::Transport(format!("SMTP task failed: {e}")))??;

        tracing::info!(to = %to, "Verification code emailed");
        Ok(())
    }
}

/// Build the verification email.
pub fn build_code_message(from: &str, to: &str, code: &str) -> Result<Message, GateError> {
    Message::builder()
        .from(
            from.parse()
                .map_err(|e| GateError::SendFailed(format!("Invalid from address: {e}")))?,
        )
        .to(to
            .parse()
            .map_err(|e| GateError::SendFailed(format!("Invalid to address: {e}")))?)
        .subject("Your verification code")
        .body(format!(
            "Your verification code is {code}\n\nEnter it to continue creating your account. \
             If you did not request this, you can ignore this email."
        ))
        .map_err(|e| GateError::SendFailed(format!("Failed to build email: {e}")))
}

// ── Development ─────────────────────────────────────────────────────

/// Writes codes to the log instead of sending them. Used when SMTP is not
/// configured.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl CodeMailer for LogMailer {
    async fn deliver(&self, to: &str, code: &str) -> Result<(), GateError> {
        tracing::warn!(to = %to, code = %code, "SMTP not configured, verification code logged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_none_without_host() {
        assert!(SmtpConfig::from_lookup(lookup_from(&[])).unwrap().is_none());
    }

    #[test]
    fn config_from_address_falls_back_to_username() {
        let cfg = SmtpConfig::from_lookup(lookup_from(&[
            ("SMTP_HOST", "smtp.acme.com"),
            ("SMTP_USERNAME", "noreply@acme.com"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(cfg.from_address, "noreply@acme.com");
        assert_eq!(cfg.port, 587);
    }

    #[test]
    fn config_requires_some_sender() {
        let err = SmtpConfig::from_lookup(lookup_from(&[("SMTP_HOST", "smtp.acme.com")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "SMTP_FROM_ADDRESS"));
    }

    #[test]
    fn message_contains_code() {
        let msg = build_code_message("noreply@acme.com", "ada@acme.com", "042917").unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("042917"));
        assert!(raw.contains("To: ada@acme.com"));
    }

    #[test]
    fn message_rejects_bad_recipient() {
        let err = build_code_message("noreply@acme.com", "not an address", "000000").unwrap_err();
        assert!(matches!(err, GateError::SendFailed(_)));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        assert!(LogMailer.deliver("ada@acme.com", "123456").await.is_ok());
    }
}
