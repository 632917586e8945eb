//! In-process verification codes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::VerificationGate;
use super::mailer::CodeMailer;
use crate::error::GateError;
use crate::wizard::validators::CODE_LEN;

#[derive(Debug, Clone)]
struct IssuedCode {
    code: String,
    expires_at: DateTime<Utc>,
    attempts: u32,
}

/// Issues 6-digit codes, remembers the latest one per address, and checks
/// guesses against it.
///
/// Re-sending replaces the previous code. A correct guess consumes the code;
/// `max_attempts` wrong guesses burn it.
pub struct LocalOtpGate {
    mailer: Arc<dyn CodeMailer>,
    codes: RwLock<HashMap<String, IssuedCode>>,
    ttl: chrono::Duration,
    max_attempts: u32,
}

impl LocalOtpGate {
    pub fn new(mailer: Arc<dyn CodeMailer>, ttl: Duration, max_attempts: u32) -> Self {
        Self {
            mailer,
            codes: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::minutes(10)),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Number of addresses with a live code.
    pub async fn outstanding(&self) -> usize {
        self.codes.read().await.len()
    }

    async fn purge_expired(&self) {
        let now = Utc::now();
        self.codes.write().await.retain(|_, c| c.expires_at > now);
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..10u32.pow(CODE_LEN as u32));
    format!("{n:0width$}", width = CODE_LEN)
}

#[async_trait]
impl VerificationGate for LocalOtpGate {
    async fn send_code(&self, email: &str) -> Result<(), GateError> {
        self.purge_expired().await;

        let code = generate_code();
        self.mailer.deliver(email, &code).await?;

        let issued = IssuedCode {
            code,
            expires_at: Utc::now() + self.ttl,
            attempts: 0,
        };
        self.codes.write().await.insert(normalize(email), issued);
        info!(email = %email, "Verification code issued");
        Ok(())
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<(), GateError> {
        let key = normalize(email);
        let mut codes = self.codes.write().await;

        let Some(issued) = codes.get_mut(&key) else {
            debug!(email = %email, "No outstanding code");
            return Err(GateError::VerificationFailed);
        };

        if issued.expires_at <= Utc::now() {
            codes.remove(&key);
            debug!(email = %email, "Code expired");
            return Err(GateError::VerificationFailed);
        }

        if issued.code != code.trim() {
            issued.attempts += 1;
            if issued.attempts >= self.max_attempts {
                codes.remove(&key);
                info!(email = %email, "Code burned after too many attempts");
            }
            return Err(GateError::VerificationFailed);
        }

        codes.remove(&key);
        info!(email = %email, "Email verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Captures delivered codes instead of sending them.
    #[derive(Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl CapturingMailer {
        fn last_code(&self) -> String {
            self.sent.lock().unwrap().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl CodeMailer for CapturingMailer {
        async fn deliver(&self, to: &str, code: &str) -> Result<(), GateError> {
            if self.fail {
                return Err(GateError::SendFailed("smtp down".into()));
            }
            self.sent.lock().unwrap().push((to.to_string(), code.to_string()));
            Ok(())
        }
    }

    fn gate(mailer: Arc<CapturingMailer>, max_attempts: u32) -> LocalOtpGate {
        LocalOtpGate::new(mailer, Duration::from_secs(600), max_attempts)
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn send_then_verify() {
        let mailer = Arc::new(CapturingMailer::default());
        let gate = gate(Arc::clone(&mailer), 5);

        gate.send_code("Ada@Acme.com").await.unwrap();
        let code = mailer.last_code();

        assert!(gate.verify_code("ada@acme.com", &code).await.is_ok());
        // Consumed
        assert_eq!(
            gate.verify_code("ada@acme.com", &code).await,
            Err(GateError::VerificationFailed)
        );
    }

    #[tokio::test]
    async fn resend_replaces_previous_code() {
        let mailer = Arc::new(CapturingMailer::default());
        let gate = gate(Arc::clone(&mailer), 5);

        gate.send_code("ada@acme.com").await.unwrap();
        let first = mailer.last_code();
        gate.send_code("ada@acme.com").await.unwrap();
        let second = mailer.last_code();
        assert_eq!(gate.outstanding().await, 1);

        if first != second {
            assert!(gate.verify_code("ada@acme.com", &first).await.is_err());
        }
        assert!(gate.verify_code("ada@acme.com", &second).await.is_ok());
    }

    #[tokio::test]
    async fn failures_are_opaque() {
        let mailer = Arc::new(CapturingMailer::default());
        let gate = gate(Arc::clone(&mailer), 5);
        gate.send_code("ada@acme.com").await.unwrap();

        let wrong_email = gate.verify_code("bob@acme.com", &mailer.last_code()).await;
        let wrong_code = gate.verify_code("ada@acme.com", "not-it").await;
        assert_eq!(wrong_email, Err(GateError::VerificationFailed));
        assert_eq!(wrong_code, Err(GateError::VerificationFailed));
    }

    #[tokio::test]
    async fn code_burned_after_max_attempts() {
        let mailer = Arc::new(CapturingMailer::default());
        let gate = gate(Arc::clone(&mailer), 2);
        gate.send_code("ada@acme.com").await.unwrap();
        let code = mailer.last_code();

        assert!(gate.verify_code("ada@acme.com", "xxxxxx").await.is_err());
        assert!(gate.verify_code("ada@acme.com", "yyyyyy").await.is_err());
        assert!(gate.verify_code("ada@acme.com", &code).await.is_err());
        assert_eq!(gate.outstanding().await, 0);
    }

    #[tokio::test]
    async fn expired_code_rejected() {
        let mailer = Arc::new(CapturingMailer::default());
        let gate = LocalOtpGate::new(Arc::clone(&mailer) as Arc<dyn CodeMailer>, Duration::ZERO, 5);
        gate.send_code("ada@acme.com").await.unwrap();
        let code = mailer.last_code();
        assert!(gate.verify_code("ada@acme.com", &code).await.is_err());
    }

    #[tokio::test]
    async fn delivery_failure_issues_nothing() {
        let mailer = Arc::new(CapturingMailer {
            fail: true,
            ..Default::default()
        });
        let gate = gate(Arc::clone(&mailer), 5);
        let err = gate.send_code("ada@acme.com").await.unwrap_err();
        assert!(matches!(err, GateError::SendFailed(_)));
        assert_eq!(gate.outstanding().await, 0);
    }
}
