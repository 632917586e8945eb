//! WizardController: owns one session's state and gates every transition.
//!
//! The controller is the only thing that mutates `WizardState`. Validators,
//! the verification gate, the enricher, and the signup store are called by
//! it and only report back.
//!
//! The state lock is never held across a collaborator call. `pending` is set
//! under the lock before the call goes out, so a second `advance()` sees it
//! and is rejected instead of queueing a second gate call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::aggregate::{BusinessProfile, OutputRecord, SignupRow, build_record};
use super::fields::{FieldErrors, FieldMap, FieldName, FieldValue};
use super::state::{WizardPhase, WizardState};
use super::steps::{self, Gate, StepDefinition};
use super::validators::FieldRules;
use crate::enrich::Enricher;
use crate::error::{GateError, SubmitError, WizardError};
use crate::otp::VerificationGate;
use crate::store::SignupStore;

/// Event broadcast channel capacity per session.
const EVENT_CAPACITY: usize = 64;

const UNVERIFIED_EMAIL: &str = "Email address has not been verified";

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct WizardDeps {
    pub rules: Arc<FieldRules>,
    pub gate: Arc<dyn VerificationGate>,
    pub enricher: Arc<dyn Enricher>,
    pub store: Arc<dyn SignupStore>,
}

/// Serializable view of a session. Never contains password values.
#[derive(Debug, Clone, Serialize)]
pub struct WizardSnapshot {
    pub session_id: Uuid,
    pub phase: WizardPhase,
    pub step: Option<u8>,
    pub fields: FieldMap,
    pub field_errors: FieldErrors,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
}

/// State-change notifications, pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardEvent {
    Snapshot { snapshot: WizardSnapshot },
    PhaseChanged { from: WizardPhase, to: WizardPhase },
    PendingChanged { pending: bool },
    FieldErrors { errors: FieldErrors },
    BusinessPrefilled { fields: Vec<FieldName> },
    Submitted { work_email: String },
}

pub struct WizardController {
    id: Uuid,
    deps: WizardDeps,
    state: RwLock<WizardState>,
    tx: broadcast::Sender<WizardEvent>,
}

impl WizardController {
    pub fn new(deps: WizardDeps) -> Self {
        Self::with_id(Uuid::new_v4(), deps)
    }

    pub fn with_id(id: Uuid, deps: WizardDeps) -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id,
            deps,
            state: RwLock::new(WizardState::default()),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Subscribe to state-change events for this session.
    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: WizardEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub async fn phase(&self) -> WizardPhase {
        self.state.read().await.phase
    }

    pub async fn is_pending(&self) -> bool {
        self.state.read().await.pending
    }

    /// Current value of a field, exactly as last written.
    pub async fn field(&self, name: FieldName) -> Option<FieldValue> {
        self.state.read().await.fields.get(name).cloned()
    }

    /// All collected fields, secrets included.
    pub async fn fields(&self) -> FieldMap {
        self.state.read().await.fields.clone()
    }

    pub async fn field_errors(&self) -> FieldErrors {
        self.state.read().await.field_errors.clone()
    }

    pub async fn last_active(&self) -> DateTime<Utc> {
        self.state.read().await.updated_at
    }

    pub async fn snapshot(&self) -> WizardSnapshot {
        let state = self.state.read().await;
        WizardSnapshot {
            session_id: self.id,
            phase: state.phase,
            step: state.phase.step_number(),
            fields: state.fields.redacted(),
            field_errors: state.field_errors.clone(),
            pending: state.pending,
            created_at: state.created_at,
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Overwrite a field. Always succeeds.
    ///
    /// The stale error for the field is dropped, then every already-entered
    /// field of the visible step is revalidated so errors surface (and clear)
    /// immediately. A field of an already-passed step is checked on its own;
    /// changing the work email after verification flags it as unverified.
    /// Writes after submission are ignored.
    pub async fn update_field(&self, name: FieldName, value: impl Into<FieldValue>) {
        let errors = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            if state.phase.is_terminal() {
                debug!(session_id = %self.id, field = %name, "Ignoring field write after submission");
                return;
            }

            state.fields.set(name, value.into());
            state.field_errors.remove(&name);

            if let Some(step) = steps::definition(state.phase) {
                let touched: Vec<FieldName> = step
                    .owned_fields
                    .iter()
                    .copied()
                    .filter(|f| state.fields.contains(*f))
                    .collect();
                let errors = self.deps.rules.validate_fields(&touched, &state.fields);
                for f in &touched {
                    state.field_errors.remove(f);
                }
                state.field_errors.extend(errors);
            }

            let passed = steps::owner_of(name).is_some_and(|owner| owner.phase < state.phase);
            if passed {
                if let Err(msg) = self.deps.rules.validate_field(name, &state.fields) {
                    state.field_errors.insert(name, msg);
                } else if name == FieldName::WorkEmail
                    && state.phase > WizardPhase::Verification
                    && !state.email_is_verified()
                {
                    warn!(session_id = %self.id, "Work email changed after verification");
                    state.field_errors.insert(name, UNVERIFIED_EMAIL.to_string());
                }
            }
            state.touch();
            state.field_errors.clone()
        };
        self.emit(WizardEvent::FieldErrors { errors });
    }

    /// Try to move forward one step.
    ///
    /// Validates the current step's fields, then runs its gate if it has one.
    /// At the last step this is `submit()`. Returns the phase the wizard is in
    /// afterwards.
    pub async fn advance(&self) -> Result<WizardPhase, WizardError> {
        let (origin, gate, email, code) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            if state.phase.is_terminal() {
                return Err(WizardError::Finished);
            }
            if state.pending {
                warn!(session_id = %self.id, phase = %state.phase, "Advance rejected, gate call in flight");
                return Err(WizardError::GatePending);
            }
            let step = steps::definition(state.phase).ok_or(WizardError::Finished)?;

            if step.terminal {
                drop(guard);
                return self.submit().await.map(|_| WizardPhase::Submitted);
            }

            if let Err(e) = self.check_step(state, step) {
                let errors = state.field_errors.clone();
                drop(guard);
                self.emit(WizardEvent::FieldErrors { errors });
                return Err(e);
            }

            let Some(gate) = step.gate else {
                let from = state.phase;
                let to = match state.advance() {
                    Ok(to) => to,
                    Err(e) => {
                        warn!(session_id = %self.id, "Failed to advance wizard: {}", e);
                        return Err(WizardError::Finished);
                    }
                };
                drop(guard);
                info!(session_id = %self.id, from = %from, to = %to, "Wizard advanced");
                self.emit(WizardEvent::PhaseChanged { from, to });
                return Ok(to);
            };

            state.pending = true;
            (
                state.phase,
                gate,
                state.fields.text_or_empty(FieldName::WorkEmail).to_string(),
                state
                    .fields
                    .text_or_empty(FieldName::VerificationCode)
                    .to_string(),
            )
        };
        self.emit(WizardEvent::PendingChanged { pending: true });

        debug!(session_id = %self.id, gate = ?gate, "Gate call started");
        let result = match gate {
            Gate::SendCode => self.deps.gate.send_code(&email).await,
            Gate::VerifyCode => self.deps.gate.verify_code(&email, &code).await,
        };

        let verified = (gate == Gate::VerifyCode).then_some(email);
        self.finish_gate(origin, verified, result).await
    }

    /// Validate a step's owned fields, recording the outcome in
    /// `field_errors`.
    fn check_step(&self, state: &mut WizardState, step: &StepDefinition) -> Result<(), WizardError> {
        let errors = self
            .deps
            .rules
            .validate_fields(step.owned_fields, &state.fields);
        for f in step.owned_fields {
            state.field_errors.remove(f);
        }
        if errors.is_empty() {
            return Ok(());
        }
        state.field_errors.extend(errors.clone());
        debug!(session_id = %self.id, phase = %state.phase, invalid = errors.len(), "Step validation failed");
        Err(WizardError::Invalid {
            phase: state.phase,
            errors,
        })
    }

    /// Apply a gate result. `verified` is the email a code check ran
    /// against, recorded on success even if the user has since moved back.
    async fn finish_gate(
        &self,
        origin: WizardPhase,
        verified: Option<String>,
        result: Result<(), GateError>,
    ) -> Result<WizardPhase, WizardError> {
        let mut state = self.state.write().await;
        state.pending = false;
        state.touch();
        if result.is_ok() && verified.is_some() {
            state.verified_email = verified;
        }

        let mut transition = None;
        let outcome = match result {
            Ok(()) if state.phase == origin => match state.advance() {
                Ok(to) => {
                    transition = Some((origin, to));
                    Ok(to)
                }
                Err(e) => {
                    warn!(session_id = %self.id, "Failed to advance wizard: {}", e);
                    Err(WizardError::Finished)
                }
            },
            Ok(()) => {
                warn!(
                    session_id = %self.id,
                    origin = %origin,
                    current = %state.phase,
                    "Phase changed while gate was in flight, not advancing"
                );
                Ok(state.phase)
            }
            Err(e) => {
                warn!(session_id = %self.id, phase = %origin, error = %e, "Gate call failed");
                Err(WizardError::Gate(e))
            }
        };
        drop(state);

        self.emit(WizardEvent::PendingChanged { pending: false });
        if let Some((from, to)) = transition {
            info!(session_id = %self.id, from = %from, to = %to, "Wizard advanced");
            self.emit(WizardEvent::PhaseChanged { from, to });
        }
        outcome
    }

    /// Re-send the verification code to the current work email.
    pub async fn resend_code(&self) -> Result<(), WizardError> {
        let email = {
            let mut state = self.state.write().await;
            if state.phase != WizardPhase::Verification {
                return Err(WizardError::NotAtPhase {
                    expected: WizardPhase::Verification,
                    actual: state.phase,
                });
            }
            if state.pending {
                return Err(WizardError::GatePending);
            }
            state.pending = true;
            state.fields.text_or_empty(FieldName::WorkEmail).to_string()
        };
        self.emit(WizardEvent::PendingChanged { pending: true });

        let result = self.deps.gate.send_code(&email).await;

        {
            let mut state = self.state.write().await;
            state.pending = false;
            state.touch();
        }
        self.emit(WizardEvent::PendingChanged { pending: false });

        match result {
            Ok(()) => {
                info!(session_id = %self.id, "Verification code re-sent");
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Resend failed");
                Err(e.into())
            }
        }
    }

    /// Go back one step. No validation; fields are kept. No-op at the first
    /// step and after submission. Not blocked by a pending gate call.
    pub async fn retreat(&self) -> WizardPhase {
        let mut state = self.state.write().await;
        let from = state.phase;
        match state.retreat() {
            Ok(to) => {
                drop(state);
                info!(session_id = %self.id, from = %from, to = %to, "Wizard retreated");
                self.emit(WizardEvent::PhaseChanged { from, to });
                to
            }
            Err(e) => {
                debug!(session_id = %self.id, "Retreat ignored: {}", e);
                from
            }
        }
    }

    /// Revalidate everything, build the output record, and append it to the
    /// signup store. Only callable at the business step.
    ///
    /// On a store failure the wizard stays at the business step with every
    /// field intact, so the call can simply be repeated.
    pub async fn submit(&self) -> Result<OutputRecord, WizardError> {
        let record = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            if state.phase.is_terminal() {
                return Err(WizardError::Finished);
            }
            if state.phase != WizardPhase::BusinessInfo {
                return Err(WizardError::NotAtPhase {
                    expected: WizardPhase::BusinessInfo,
                    actual: state.phase,
                });
            }
            if state.pending {
                return Err(WizardError::GatePending);
            }

            let all: Vec<FieldName> = steps::all_owned_fields().collect();
            let mut errors = self.deps.rules.validate_fields(&all, &state.fields);
            if !errors.contains_key(&FieldName::WorkEmail) && !state.email_is_verified() {
                errors.insert(FieldName::WorkEmail, UNVERIFIED_EMAIL.to_string());
            }
            if !errors.is_empty() {
                state.field_errors = errors.clone();
                drop(guard);
                warn!(session_id = %self.id, invalid = errors.len(), "Submission blocked by invalid fields");
                self.emit(WizardEvent::FieldErrors {
                    errors: errors.clone(),
                });
                return Err(WizardError::Invalid {
                    phase: WizardPhase::BusinessInfo,
                    errors,
                });
            }

            let record = build_record(&state.fields)?;
            state.pending = true;
            record
        };
        self.emit(WizardEvent::PendingChanged { pending: true });

        let row = SignupRow::from_record(&record, Utc::now());
        let result = self.deps.store.append_signup(&row).await;

        // The row is stored, so the wizard is done even if the user moved
        // back while the append was in flight.
        let from = {
            let mut state = self.state.write().await;
            state.pending = false;
            state.touch();
            result.is_ok().then(|| state.mark_submitted())
        };
        self.emit(WizardEvent::PendingChanged { pending: false });

        match result {
            Ok(id) => {
                info!(session_id = %self.id, signup_id = %id, "Signup submitted");
                if let Some(from) = from {
                    self.emit(WizardEvent::PhaseChanged {
                        from,
                        to: WizardPhase::Submitted,
                    });
                }
                self.emit(WizardEvent::Submitted {
                    work_email: record.work_email.clone(),
                });
                Ok(record)
            }
            Err(e) => {
                error!(session_id = %self.id, error = %e, "Failed to persist signup");
                Err(WizardError::Submission(SubmitError::Store(e)))
            }
        }
    }

    /// Best-effort company lookup for the current work email.
    ///
    /// Fills only business fields that are still blank, so user input is
    /// never overwritten. A failed lookup is logged and otherwise ignored.
    /// Returns the fields that were filled.
    pub async fn prefill_business(&self) -> Vec<FieldName> {
        let email = {
            let state = self.state.read().await;
            if state.phase.is_terminal() {
                return Vec::new();
            }
            state.fields.text_or_empty(FieldName::WorkEmail).to_string()
        };
        if email.is_empty() {
            return Vec::new();
        }

        let profile: BusinessProfile = match self.deps.enricher.lookup(&email).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Enrichment failed, business fields left for manual entry");
                return Vec::new();
            }
        };

        let filled = {
            let mut state = self.state.write().await;
            if state.phase.is_terminal() {
                return Vec::new();
            }
            let mut filled = Vec::new();
            for (name, value) in profile.as_fields() {
                if !value.is_empty() && state.fields.is_blank(name) {
                    state.fields.set(name, value.into());
                    filled.push(name);
                }
            }
            state.touch();
            filled
        };

        if !filled.is_empty() {
            info!(session_id = %self.id, count = filled.len(), "Business fields pre-filled");
            self.emit(WizardEvent::BusinessPrefilled {
                fields: filled.clone(),
            });
        }
        filled
    }
}
