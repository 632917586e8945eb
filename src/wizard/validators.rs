//! Field and cross-field validation rules.
//!
//! Validators are pure: they read the full field map and return messages,
//! they never mutate anything. The controller decides what to do with them.

use regex::Regex;

use super::fields::{FieldErrors, FieldMap, FieldName};
use crate::config::DEFAULT_FREE_MAIL_DOMAINS;

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Exact verification code length, in characters.
pub const CODE_LEN: usize = 6;

/// Validation rule set with a configurable free-mail blacklist.
#[derive(Debug, Clone)]
pub struct FieldRules {
    email: Regex,
    free_mail_domains: Vec<String>,
}

impl Default for FieldRules {
    fn default() -> Self {
        Self::new(DEFAULT_FREE_MAIL_DOMAINS.iter().map(|d| d.to_string()).collect())
    }
}

impl FieldRules {
    pub fn new(free_mail_domains: Vec<String>) -> Self {
        Self {
            email: Regex::new(
                r"^[A-Za-z0-9_'+\-.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$",
            )
            .unwrap(),
            free_mail_domains: free_mail_domains
                .into_iter()
                .map(|d| d.to_lowercase())
                .collect(),
        }
    }

    /// Validate a single field against the full map (cross-field rules
    /// look at their partner field).
    pub fn validate_field(&self, name: FieldName, fields: &FieldMap) -> Result<(), String> {
        match name {
            FieldName::FirstName => require_text(fields, name, "First name is required"),
            FieldName::LastName => require_text(fields, name, "Last name is required"),
            FieldName::WorkEmail => self.check_work_email(fields.text_or_empty(name)),
            FieldName::AcceptTerms => match fields.flag(name) {
                Some(true) => Ok(()),
                _ => Err("You must accept the conditions".to_string()),
            },
            FieldName::VerificationCode => {
                if fields.text_or_empty(name).chars().count() == CODE_LEN {
                    Ok(())
                } else {
                    Err(format!("Code must be {CODE_LEN} digits"))
                }
            }
            FieldName::Password => check_password(fields.text_or_empty(name)),
            FieldName::ConfirmPassword => {
                let confirm = fields.text_or_empty(FieldName::ConfirmPassword);
                let password = fields.text_or_empty(FieldName::Password);
                if fields.get(name).is_some_and(|v| v.as_text().is_none()) || confirm != password {
                    Err("Passwords do not match".to_string())
                } else {
                    Ok(())
                }
            }
            FieldName::CompanyName
            | FieldName::Industry
            | FieldName::Country
            | FieldName::Website => match fields.get(name) {
                Some(v) if v.as_text().is_none() => Err("Must be text".to_string()),
                _ => Ok(()),
            },
        }
    }

    /// Validate a set of fields, collecting every failure.
    pub fn validate_fields(&self, names: &[FieldName], fields: &FieldMap) -> FieldErrors {
        names
            .iter()
            .filter_map(|name| {
                self.validate_field(*name, fields)
                    .err()
                    .map(|msg| (*name, msg))
            })
            .collect()
    }

    /// Whether the address's domain is on the free-mail blacklist.
    /// An address without a domain part is treated as blacklisted.
    pub fn is_free_mail(&self, email: &str) -> bool {
        match email.split('@').nth(1) {
            Some(domain) if !domain.is_empty() => {
                let domain = domain.to_lowercase();
                self.free_mail_domains.iter().any(|d| *d == domain)
            }
            _ => true,
        }
    }

    pub fn is_well_formed_email(&self, email: &str) -> bool {
        !email.starts_with('.') && !email.contains("..") && self.email.is_match(email)
    }

    fn check_work_email(&self, email: &str) -> Result<(), String> {
        if !self.is_well_formed_email(email) {
            return Err("Invalid email address".to_string());
        }
        if self.is_free_mail(email) {
            return Err("Please use a work email address".to_string());
        }
        Ok(())
    }
}

fn require_text(fields: &FieldMap, name: FieldName, message: &str) -> Result<(), String> {
    if fields.is_blank(name) {
        Err(message.to_string())
    } else {
        Ok(())
    }
}

fn check_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Must contain at least one number".to_string());
    }
    Ok(())
}
