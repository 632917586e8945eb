use std::sync::Arc;

use anyhow::Context;
use signup_wizard::config::{ServerConfig, WizardConfig};
use signup_wizard::enrich::{EnrichConfig, create_enricher};
use signup_wizard::otp::{SmtpConfig, create_gate};
use signup_wizard::store::{LibSqlBackend, SignupStore};
use signup_wizard::wizard::registry::{self, SessionRegistry};
use signup_wizard::wizard::{FieldRules, WizardDeps, wizard_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server_config = ServerConfig::from_env()?;
    let wizard_config = WizardConfig::from_env();

    eprintln!("📝 Signup Wizard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/wizard", server_config.port);
    eprintln!("   WS:  ws://0.0.0.0:{}/ws/wizard/{{id}}", server_config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn SignupStore> = Arc::new(
        LibSqlBackend::new_local(&server_config.db_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open database at {}",
                    server_config.db_path.display()
                )
            })?,
    );
    eprintln!("   Database: {}", server_config.db_path.display());

    // ── Collaborators ───────────────────────────────────────────────────
    let gate = create_gate(
        std::env::var("OTP_SERVICE_URL").ok(),
        SmtpConfig::from_env()?,
        wizard_config.code_ttl,
        wizard_config.max_code_attempts,
    );

    let enrich_config = EnrichConfig::from_env();
    eprintln!(
        "   Enrichment: {}",
        if enrich_config.is_some() { "enabled" } else { "disabled" }
    );
    let enricher = create_enricher(enrich_config);

    let deps = WizardDeps {
        rules: Arc::new(FieldRules::new(wizard_config.free_mail_domains.clone())),
        gate,
        enricher,
        store,
    };

    // ── Sessions ────────────────────────────────────────────────────────
    let sessions = Arc::new(SessionRegistry::new(
        deps,
        wizard_config.session_idle_timeout,
    ));
    let _expiry_handle = registry::spawn_expiry_task(Arc::clone(&sessions));

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = wizard_routes(sessions);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", server_config.port))?;
    tracing::info!(port = server_config.port, "Signup wizard server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
