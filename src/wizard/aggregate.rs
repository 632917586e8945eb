//! Final record assembly.
//!
//! Turns a fully validated field map into the single `OutputRecord`, and the
//! record into the row handed to the persistence sink.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

use super::fields::{FieldMap, FieldName};
use crate::error::SubmitError;

/// Company profile collected on the last step (or pre-filled by enrichment).
/// Missing values are empty strings, never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessProfile {
    pub company_name: String,
    pub industry: String,
    pub country: String,
    pub website: String,
}

impl BusinessProfile {
    pub fn is_empty(&self) -> bool {
        self.company_name.is_empty()
            && self.industry.is_empty()
            && self.country.is_empty()
            && self.website.is_empty()
    }

    /// Pairs of (field, value) for writing back into a field map.
    pub fn as_fields(&self) -> [(FieldName, &str); 4] {
        [
            (FieldName::CompanyName, self.company_name.as_str()),
            (FieldName::Industry, self.industry.as_str()),
            (FieldName::Country, self.country.as_str()),
            (FieldName::Website, self.website.as_str()),
        ]
    }
}

/// The aggregated result of a completed wizard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub first_name: String,
    pub last_name: String,
    pub work_email: String,
    #[serde(serialize_with = "expose_secret")]
    pub password: SecretString,
    pub is_domain_conditions_accepted: bool,
    pub business: BusinessProfile,
}

fn expose_secret<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Build the output record from validated fields.
///
/// Required fields must be present; optional business fields default to "".
pub fn build_record(fields: &FieldMap) -> Result<OutputRecord, SubmitError> {
    let required = |name: FieldName| -> Result<String, SubmitError> {
        fields
            .text(name)
            .map(str::to_string)
            .ok_or(SubmitError::MissingField(name))
    };
    let optional = |name: FieldName| fields.text_or_empty(name).to_string();

    Ok(OutputRecord {
        first_name: required(FieldName::FirstName)?,
        last_name: required(FieldName::LastName)?,
        work_email: required(FieldName::WorkEmail)?,
        password: SecretString::from(required(FieldName::Password)?),
        is_domain_conditions_accepted: fields
            .flag(FieldName::AcceptTerms)
            .ok_or(SubmitError::MissingField(FieldName::AcceptTerms))?,
        business: BusinessProfile {
            company_name: optional(FieldName::CompanyName),
            industry: optional(FieldName::Industry),
            country: optional(FieldName::Country),
            website: optional(FieldName::Website),
        },
    })
}

/// Row appended to the signup sink. The password is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRow {
    pub timestamp: DateTime<Utc>,
    pub first_name: String,
    pub last_name: String,
    pub work_email: String,
    pub business: BusinessProfile,
}

impl SignupRow {
    pub fn from_record(record: &OutputRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            work_email: record.work_email.clone(),
            business: record.business.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_fields() -> FieldMap {
        let mut f = FieldMap::new();
        f.set(FieldName::FirstName, "Ada".into());
        f.set(FieldName::LastName, "Lovelace".into());
        f.set(FieldName::WorkEmail, "ada@acme.com".into());
        f.set(FieldName::AcceptTerms, true.into());
        f.set(FieldName::VerificationCode, "123456".into());
        f.set(FieldName::Password, "Abcdefg1".into());
        f.set(FieldName::ConfirmPassword, "Abcdefg1".into());
        f.set(FieldName::CompanyName, "Acme".into());
        f
    }

    #[test]
    fn record_has_fixed_layout() {
        let record = build_record(&complete_fields()).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "workEmail": "ada@acme.com",
                "password": "Abcdefg1",
                "isDomainConditionsAccepted": true,
                "business": {
                    "companyName": "Acme",
                    "industry": "",
                    "country": "",
                    "website": ""
                }
            })
        );
    }

    #[test]
    fn record_debug_hides_password() {
        let record = build_record(&complete_fields()).unwrap();
        assert!(!format!("{record:?}").contains("Abcdefg1"));
    }

    #[test]
    fn missing_required_field() {
        let mut fields = complete_fields();
        fields.set(FieldName::AcceptTerms, "yes".into());
        let err = build_record(&fields).unwrap_err();
        assert!(matches!(err, SubmitError::MissingField(FieldName::AcceptTerms)));
    }

    #[test]
    fn row_drops_password() {
        let record = build_record(&complete_fields()).unwrap();
        let row = SignupRow::from_record(&record, Utc::now());
        let json = serde_json::to_string(&row).unwrap();
        assert!(!json.contains("Abcdefg1"));
        assert_eq!(row.business.company_name, "Acme");
    }
}
