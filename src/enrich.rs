//! Company enrichment: best-effort lookup of business details from a work
//! email, used to pre-fill the last wizard step.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::EnrichError;
use crate::wizard::aggregate::BusinessProfile;

/// Looks up a company profile for an email address.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn lookup(&self, email: &str) -> Result<BusinessProfile, EnrichError>;
}

/// The Companies API settings.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub base_url: String,
    pub token: SecretString,
}

impl EnrichConfig {
    /// Returns `None` if `THE_COMPANIES_API_TOKEN` is not set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let token = lookup("THE_COMPANIES_API_TOKEN").filter(|t| !t.is_empty())?;
        let base_url = lookup("ENRICH_BASE_URL")
            .unwrap_or_else(|| "https://www.thecompaniesapi.com".to_string());
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: SecretString::from(token),
        })
    }
}

/// Build an enricher from optional configuration.
pub fn create_enricher(config: Option<EnrichConfig>) -> Arc<dyn Enricher> {
    match config {
        Some(config) => {
            tracing::info!(base_url = %config.base_url, "Company enrichment enabled");
            Arc::new(CompaniesApiEnricher::new(config))
        }
        None => {
            tracing::info!("Company enrichment disabled (no API token)");
            Arc::new(DisabledEnricher)
        }
    }
}

/// Client for `GET /api/enrich-company-from-email`.
pub struct CompaniesApiEnricher {
    config: EnrichConfig,
    client: reqwest::Client,
}

impl CompaniesApiEnricher {
    pub fn new(config: EnrichConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Enricher for CompaniesApiEnricher {
    async fn lookup(&self, email: &str) -> Result<BusinessProfile, EnrichError> {
        let url = format!("{}/api/enrich-company-from-email", self.config.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("email", email), ("token", self.config.token.expose_secret())])
            .send()
            .await
            .map_err(|e| EnrichError::Request(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            return Err(EnrichError::Upstream {
                status: resp.status().as_u16(),
            });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| EnrichError::InvalidResponse(e.to_string()))?;
        Ok(profile_from_company(&data))
    }
}

/// Used when enrichment is not configured; every lookup fails.
#[derive(Debug, Default)]
pub struct DisabledEnricher;

#[async_trait]
impl Enricher for DisabledEnricher {
    async fn lookup(&self, _email: &str) -> Result<BusinessProfile, EnrichError> {
        Err(EnrichError::NotConfigured)
    }
}

/// Map a company payload onto the business profile. Unknown shapes yield
/// empty strings rather than errors.
pub fn profile_from_company(data: &Value) -> BusinessProfile {
    let company = data.get("company").unwrap_or(data);

    let str_at = |path: &[&str]| -> Option<String> {
        let mut cur = company;
        for key in path {
            cur = cur.get(*key)?;
        }
        cur.as_str().map(str::to_string).filter(|s| !s.is_empty())
    };

    let industry = str_at(&["industryMain"])
        .or_else(|| str_at(&["industry"]))
        .or_else(|| {
            company
                .get("industries")
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .and_then(Value::as_str)
                .map(str::to_string)
        });

    BusinessProfile {
        company_name: str_at(&["name"]).unwrap_or_default(),
        industry: industry.unwrap_or_default(),
        country: str_at(&["locations", "headquarters", "country", "name"])
            .or_else(|| str_at(&["country"]))
            .unwrap_or_default(),
        website: str_at(&["website"])
            .or_else(|| str_at(&["domain", "domain"]))
            .or_else(|| str_at(&["domain"]))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};

    use super::*;

    #[test]
    fn maps_nested_company_payload() {
        let data = serde_json::json!({
            "name": "Acme Corp",
            "industryMain": "manufacturing",
            "domain": {"domain": "acme.com"},
            "locations": {"headquarters": {"country": {"code": "us", "name": "United States"}}}
        });
        let p = profile_from_company(&data);
        assert_eq!(p.company_name, "Acme Corp");
        assert_eq!(p.industry, "manufacturing");
        assert_eq!(p.country, "United States");
        assert_eq!(p.website, "acme.com");
    }

    #[test]
    fn maps_flat_and_wrapped_payloads() {
        let data = serde_json::json!({
            "company": {"name": "Initech", "industries": ["software"], "country": "US", "website": "https://initech.io"}
        });
        let p = profile_from_company(&data);
        assert_eq!(p.company_name, "Initech");
        assert_eq!(p.industry, "software");
        assert_eq!(p.country, "US");
        assert_eq!(p.website, "https://initech.io");
    }

    #[test]
    fn unknown_shape_is_empty() {
        assert!(profile_from_company(&serde_json::json!({"unexpected": 1})).is_empty());
        assert!(profile_from_company(&serde_json::json!([1, 2])).is_empty());
    }

    #[test]
    fn config_requires_token() {
        assert!(EnrichConfig::from_lookup(|_| None).is_none());
        let cfg = EnrichConfig::from_lookup(|k| {
            (k == "THE_COMPANIES_API_TOKEN").then(|| "tok".to_string())
        })
        .unwrap();
        assert_eq!(cfg.base_url, "https://www.thecompaniesapi.com");
    }

    #[tokio::test]
    async fn disabled_enricher_fails() {
        assert!(matches!(
            DisabledEnricher.lookup("ada@acme.com").await,
            Err(EnrichError::NotConfigured)
        ));
    }

    async fn enrich_stub(Query(q): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
        if q.get("token").map(String::as_str) != Some("secret") {
            return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({})));
        }
        (
            StatusCode::OK,
            Json(serde_json::json!({"name": "Acme", "domain": {"domain": "acme.com"}})),
        )
    }

    async fn start_stub() -> String {
        let app = Router::new().route("/api/enrich-company-from-email", get(enrich_stub));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{port}")
    }

    #[tokio::test]
    async fn companies_api_roundtrip() {
        let base_url = start_stub().await;

        let ok = CompaniesApiEnricher::new(EnrichConfig {
            base_url: base_url.clone(),
            token: SecretString::from("secret"),
        });
        let profile = ok.lookup("ada@acme.com").await.unwrap();
        assert_eq!(profile.company_name, "Acme");
        assert_eq!(profile.website, "acme.com");

        let bad = CompaniesApiEnricher::new(EnrichConfig {
            base_url,
            token: SecretString::from("wrong"),
        });
        assert!(matches!(
            bad.lookup("ada@acme.com").await,
            Err(EnrichError::Upstream { status: 401 })
        ));
    }
}
