//! Field names, values, and the collected-field map.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every field the wizard collects, across all steps.
///
/// Wire names are camelCase (`workEmail`, `acceptTerms`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    FirstName,
    LastName,
    WorkEmail,
    AcceptTerms,
    VerificationCode,
    Password,
    ConfirmPassword,
    CompanyName,
    Industry,
    Country,
    Website,
}

impl FieldName {
    pub const ALL: [FieldName; 11] = [
        FieldName::FirstName,
        FieldName::LastName,
        FieldName::WorkEmail,
        FieldName::AcceptTerms,
        FieldName::VerificationCode,
        FieldName::Password,
        FieldName::ConfirmPassword,
        FieldName::CompanyName,
        FieldName::Industry,
        FieldName::Country,
        FieldName::Website,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstName => "firstName",
            Self::LastName => "lastName",
            Self::WorkEmail => "workEmail",
            Self::AcceptTerms => "acceptTerms",
            Self::VerificationCode => "verificationCode",
            Self::Password => "password",
            Self::ConfirmPassword => "confirmPassword",
            Self::CompanyName => "companyName",
            Self::Industry => "industry",
            Self::Country => "country",
            Self::Website => "website",
        }
    }

    /// Values that must never be echoed back in snapshots or logs.
    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Password | Self::ConfirmPassword)
    }

    /// Whether the field holds a boolean rather than text.
    pub fn is_flag(&self) -> bool {
        matches!(self, Self::AcceptTerms)
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldName::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Unknown field: {s}"))
    }
}

/// A field value as entered. Stored exactly as written, no coercion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            Self::Text(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

/// Per-field validation messages.
pub type FieldErrors = BTreeMap<FieldName, String>;

/// The union of all collected fields. A field is absent until first written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<FieldName, FieldValue>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: FieldName) -> Option<&FieldValue> {
        self.0.get(&name)
    }

    pub fn set(&mut self, name: FieldName, value: FieldValue) {
        self.0.insert(name, value);
    }

    pub fn contains(&self, name: FieldName) -> bool {
        self.0.contains_key(&name)
    }

    /// Text value of a field, `None` if absent or not text.
    pub fn text(&self, name: FieldName) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// Text value of a field, or `""` when absent.
    pub fn text_or_empty(&self, name: FieldName) -> &str {
        self.text(name).unwrap_or("")
    }

    pub fn flag(&self, name: FieldName) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_flag)
    }

    /// Whether a text field is absent or empty.
    pub fn is_blank(&self, name: FieldName) -> bool {
        self.text(name).is_none_or(str::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &FieldValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Copy with secret fields removed, for snapshots.
    pub fn redacted(&self) -> FieldMap {
        FieldMap(
            self.0
                .iter()
                .filter(|(k, _)| !k.is_secret())
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip_through_str() {
        for name in FieldName::ALL {
            assert_eq!(name.as_str().parse::<FieldName>().unwrap(), name);
            let json = serde_json::to_string(&name).unwrap();
            assert_eq!(json, format!("\"{name}\""));
        }
        assert!("nickname".parse::<FieldName>().is_err());
    }

    #[test]
    fn value_untagged_serde() {
        let v: FieldValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, FieldValue::Flag(true));
        let v: FieldValue = serde_json::from_str("\"Ada\"").unwrap();
        assert_eq!(v, FieldValue::Text("Ada".into()));
    }

    #[test]
    fn set_then_get_returns_exact_value() {
        let mut map = FieldMap::new();
        map.set(FieldName::FirstName, "  Ada ".into());
        map.set(FieldName::AcceptTerms, true.into());
        assert_eq!(map.text(FieldName::FirstName), Some("  Ada "));
        assert_eq!(map.flag(FieldName::AcceptTerms), Some(true));
        assert!(map.is_blank(FieldName::LastName));
        assert_eq!(map.text_or_empty(FieldName::LastName), "");
    }

    #[test]
    fn redacted_drops_passwords() {
        let mut map = FieldMap::new();
        map.set(FieldName::Password, "Secret123".into());
        map.set(FieldName::ConfirmPassword, "Secret123".into());
        map.set(FieldName::WorkEmail, "a@acme.com".into());
        let json = serde_json::to_value(map.redacted()).unwrap();
        assert_eq!(json, serde_json::json!({"workEmail": "a@acme.com"}));
    }
}
