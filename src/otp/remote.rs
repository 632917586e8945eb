//! HTTP verification service client.
//!
//! Contract: `POST {base}/send {"email"}` and `POST {base}/verify
//! {"email", "code"}`, 2xx on success, `{"error": "..."}` on failure.

use async_trait::async_trait;
use serde::Deserialize;

use super::VerificationGate;
use crate::error::GateError;

pub struct RemoteOtpGate {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl RemoteOtpGate {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, op: &str) -> String {
        format!("{}/{op}", self.base_url)
    }

    async fn post(&self, op: &str, body: serde_json::Value) -> Result<reqwest::Response, GateError> {
        self.client
            .post(self.url(op))
            .json(&body)
            .send()
            .await
            .map_err(|e| GateError::Transport(e.to_string()))
    }
}

#[async_trait]
impl VerificationGate for RemoteOtpGate {
    async fn send_code(&self, email: &str) -> Result<(), GateError> {
        let resp = self.post("send", serde_json::json!({ "email": email })).await?;
        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let message = resp
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| "Failed to send code".to_string());
        tracing::warn!(status = %status, error = %message, "Send-code request rejected");
        Err(GateError::SendFailed(message))
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<(), GateError> {
        let resp = self
            .post("verify", serde_json::json!({ "email": email, "code": code }))
            .await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(GateError::Transport(format!("verify returned {status}")))
        } else {
            Err(GateError::VerificationFailed)
        }
    }
}
