//! Signup Wizard: multi-step account creation with email verification.

pub mod config;
pub mod enrich;
pub mod error;
pub mod otp;
pub mod store;
pub mod wizard;
