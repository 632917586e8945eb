//! Error types for the signup wizard.

use crate::wizard::fields::{FieldErrors, FieldName};
use crate::wizard::state::WizardPhase;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Verification gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Enrichment error: {0}")]
    Enrich(#[from] EnrichError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Failures of the send-code / verify-code collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("Failed to send verification code: {0}")]
    SendFailed(String),

    /// Deliberately opaque: never says whether the email or the code was wrong.
    #[error("Invalid or expired verification code")]
    VerificationFailed,

    #[error("Verification service unreachable: {0}")]
    Transport(String),

    #[error("Verification service is not configured")]
    NotConfigured,
}

/// Company enrichment lookup errors. Never block the wizard.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("Enrichment is not configured")]
    NotConfigured,

    #[error("Enrichment request failed: {0}")]
    Request(String),

    #[error("Enrichment upstream returned {status}")]
    Upstream { status: u16 },

    #[error("Invalid enrichment response: {0}")]
    InvalidResponse(String),
}

/// Errors raised while building or persisting the final record.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Cannot build record, field {0} is missing")]
    MissingField(FieldName),

    #[error("Failed to persist signup: {0}")]
    Store(#[from] DatabaseError),
}

/// Errors returned by wizard controller operations.
///
/// Every variant leaves the session in a consistent, resumable state.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Validation failed in {phase}: {} field(s) invalid", errors.len())]
    Invalid {
        phase: WizardPhase,
        errors: FieldErrors,
    },

    #[error("A transition is already in progress")]
    GatePending,

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Submission(#[from] SubmitError),

    #[error("Operation requires phase {expected}, wizard is at {actual}")]
    NotAtPhase {
        expected: WizardPhase,
        actual: WizardPhase,
    },

    #[error("Wizard has already been submitted")]
    Finished,
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
