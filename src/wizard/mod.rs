//! Four-step signup wizard.
//!
//! Account info → email verification → password → business info → submitted.
//! `WizardController` owns one session's state; `SessionRegistry` keeps live
//! sessions; `routes` exposes them over HTTP and WebSocket.

pub mod aggregate;
pub mod controller;
pub mod fields;
pub mod registry;
pub mod routes;
pub mod state;
pub mod steps;
pub mod validators;

pub use aggregate::{BusinessProfile, OutputRecord, SignupRow};
pub use controller::{WizardController, WizardDeps, WizardEvent, WizardSnapshot};
pub use fields::{FieldErrors, FieldMap, FieldName, FieldValue};
pub use registry::SessionRegistry;
pub use routes::wizard_routes;
pub use state::{WizardPhase, WizardState};
pub use validators::FieldRules;
