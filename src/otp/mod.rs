//! Email verification gate.
//!
//! The wizard only sees the `VerificationGate` trait: send a code to an
//! address, check a code for an address. Two implementations:
//!
//! - `LocalOtpGate` issues and checks codes in-process and delivers them via
//!   a `CodeMailer` (SMTP, or the log in development).
//! - `RemoteOtpGate` forwards both calls to an external HTTP service.

pub mod local;
pub mod mailer;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::GateError;

pub use local::LocalOtpGate;
pub use mailer::{CodeMailer, LogMailer, SmtpConfig, SmtpMailer};
pub use remote::RemoteOtpGate;

/// Send-code / verify-code collaborator.
#[async_trait]
pub trait VerificationGate: Send + Sync {
    /// Send (or re-send) a verification code. Safe to call repeatedly.
    async fn send_code(&self, email: &str) -> Result<(), GateError>;

    /// Check a code for an address. Any mismatch is `VerificationFailed`.
    async fn verify_code(&self, email: &str, code: &str) -> Result<(), GateError>;
}

/// Pick a gate from configuration.
///
/// A remote service URL wins. Otherwise codes are issued locally and mailed
/// over SMTP, or written to the log when SMTP is not configured.
pub fn create_gate(
    remote_url: Option<String>,
    smtp: Option<SmtpConfig>,
    code_ttl: Duration,
    max_attempts: u32,
) -> Arc<dyn VerificationGate> {
    if let Some(url) = remote_url.filter(|u| !u.trim().is_empty()) {
        info!(url = %url, "Using remote verification service");
        return Arc::new(RemoteOtpGate::new(url));
    }
    let mailer: Arc<dyn CodeMailer> = match smtp {
        Some(config) => {
            info!(host = %config.host, "Verification codes delivered over SMTP");
            Arc::new(SmtpMailer::new(config))
        }
        None => {
            warn!("SMTP not configured, verification codes will be written to the log");
            Arc::new(LogMailer)
        }
    };
    Arc::new(LocalOtpGate::new(mailer, code_ttl, max_attempts))
}
