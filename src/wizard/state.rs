//! Wizard state machine: tracks which step the user is on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fields::{FieldErrors, FieldMap, FieldName};

/// The phases of the signup wizard.
///
/// Progresses linearly: AccountInfo → Verification → Password →
/// BusinessInfo → Submitted, with single-step backward moves allowed
/// between the four steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardPhase {
    AccountInfo,
    Verification,
    Password,
    BusinessInfo,
    Submitted,
}

impl WizardPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: WizardPhase) -> bool {
        use WizardPhase::*;
        matches!(
            (self, target),
            (AccountInfo, Verification)
                | (Verification, Password)
                | (Password, BusinessInfo)
                | (BusinessInfo, Submitted)
                | (Verification, AccountInfo)
                | (Password, Verification)
                | (BusinessInfo, Password)
        )
    }

    /// Whether the wizard is done.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Submitted)
    }

    /// The next phase in the forward progression, if any.
    pub fn next(&self) -> Option<WizardPhase> {
        use WizardPhase::*;
        match self {
            AccountInfo => Some(Verification),
            Verification => Some(Password),
            Password => Some(BusinessInfo),
            BusinessInfo => Some(Submitted),
            Submitted => None,
        }
    }

    /// The previous step, if backward navigation is possible.
    pub fn previous(&self) -> Option<WizardPhase> {
        use WizardPhase::*;
        match self {
            AccountInfo | Submitted => None,
            Verification => Some(AccountInfo),
            Password => Some(Verification),
            BusinessInfo => Some(Password),
        }
    }

    /// 1-based step number; `Submitted` has none.
    pub fn step_number(&self) -> Option<u8> {
        match self {
            Self::AccountInfo => Some(1),
            Self::Verification => Some(2),
            Self::Password => Some(3),
            Self::BusinessInfo => Some(4),
            Self::Submitted => None,
        }
    }
}

impl Default for WizardPhase {
    fn default() -> Self {
        Self::AccountInfo
    }
}

impl std::fmt::Display for WizardPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AccountInfo => "account_info",
            Self::Verification => "verification",
            Self::Password => "password",
            Self::BusinessInfo => "business_info",
            Self::Submitted => "submitted",
        };
        write!(f, "{s}")
    }
}

/// Per-session wizard state. Owned by exactly one controller.
#[derive(Debug, Clone)]
pub struct WizardState {
    pub phase: WizardPhase,
    pub fields: FieldMap,
    pub field_errors: FieldErrors,
    /// True while a gate or submission call is outstanding.
    pub pending: bool,
    /// The work email that last passed code verification.
    pub verified_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for WizardState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            phase: WizardPhase::default(),
            fields: FieldMap::new(),
            field_errors: FieldErrors::new(),
            pending: false,
            verified_email: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl WizardState {
    /// Move forward one phase. Fields are never touched.
    pub fn advance(&mut self) -> Result<WizardPhase, String> {
        let next = self
            .phase
            .next()
            .ok_or_else(|| "Already at terminal phase".to_string())?;
        self.move_to(next)
    }

    /// Move back one step. Fields are never touched.
    pub fn retreat(&mut self) -> Result<WizardPhase, String> {
        let prev = self
            .phase
            .previous()
            .ok_or_else(|| format!("Cannot go back from {}", self.phase))?;
        self.move_to(prev)
    }

    fn move_to(&mut self, target: WizardPhase) -> Result<WizardPhase, String> {
        if !self.phase.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.phase, target));
        }
        self.phase = target;
        self.touch();
        Ok(target)
    }

    /// Finish the wizard once the record is stored, from whatever step the
    /// user is looking at. Returns the phase it left.
    pub fn mark_submitted(&mut self) -> WizardPhase {
        let from = self.phase;
        self.phase = WizardPhase::Submitted;
        self.touch();
        from
    }

    /// Whether the current work email is the one that was verified.
    pub fn email_is_verified(&self) -> bool {
        self.verified_email.is_some()
            && self.verified_email.as_deref() == self.fields.text(FieldName::WorkEmail)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
