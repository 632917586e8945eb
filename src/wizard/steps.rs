//! Static step table: which fields each step owns and which external check
//! must pass before leaving it.

use super::fields::FieldName;
use super::state::WizardPhase;

/// External asynchronous check required to leave a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Send a verification code to `workEmail`.
    SendCode,
    /// Check `verificationCode` against `workEmail`.
    VerifyCode,
}

#[derive(Debug)]
pub struct StepDefinition {
    pub phase: WizardPhase,
    pub owned_fields: &'static [FieldName],
    pub gate: Option<Gate>,
    /// Advancing past a terminal step means submitting.
    pub terminal: bool,
}

impl StepDefinition {
    pub fn owns(&self, field: FieldName) -> bool {
        self.owned_fields.contains(&field)
    }
}

pub static STEPS: [StepDefinition; 4] = [
    StepDefinition {
        phase: WizardPhase::AccountInfo,
        owned_fields: &[
            FieldName::FirstName,
            FieldName::LastName,
            FieldName::WorkEmail,
            FieldName::AcceptTerms,
        ],
        gate: Some(Gate::SendCode),
        terminal: false,
    },
    StepDefinition {
        phase: WizardPhase::Verification,
        owned_fields: &[FieldName::VerificationCode],
        gate: Some(Gate::VerifyCode),
        terminal: false,
    },
    StepDefinition {
        phase: WizardPhase::Password,
        owned_fields: &[FieldName::Password, FieldName::ConfirmPassword],
        gate: None,
        terminal: false,
    },
    StepDefinition {
        phase: WizardPhase::BusinessInfo,
        owned_fields: &[
            FieldName::CompanyName,
            FieldName::Industry,
            FieldName::Country,
            FieldName::Website,
        ],
        gate: None,
        terminal: true,
    },
];

/// Definition for a phase; `None` for `Submitted`.
pub fn definition(phase: WizardPhase) -> Option<&'static StepDefinition> {
    STEPS.iter().find(|s| s.phase == phase)
}

/// The step that owns a field.
pub fn owner_of(field: FieldName) -> Option<&'static StepDefinition> {
    STEPS.iter().find(|s| s.owns(field))
}

/// Every field owned by any step, in step order.
pub fn all_owned_fields() -> impl Iterator<Item = FieldName> {
    STEPS.iter().flat_map(|s| s.owned_fields.iter().copied())
}
