use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::name::parse_name;
use super::validation::{validate_address, validate_email, validate_phone};
use crate::entity::EntityType;

/// Confidence stamped on every record produced by the pipeline
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// A field value that failed its acceptance rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("invalid phone number: '{0}'")]
    Phone(String),

    #[error("invalid address: '{0}'")]
    Address(String),

    #[error("invalid email: '{0}'")]
    Email(String),

    #[error("invalid name: '{0}'")]
    Name(String),
}

/// A ten-digit phone number, digits only
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Option<Self> {
        validate_phone(raw).map(PhoneNumber)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PhoneNumber::parse(&value).ok_or(FieldError::Phone(value))
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A street address that passed the plausibility check
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Option<Self> {
        validate_address(raw).map(Address)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value).ok_or(FieldError::Address(value))
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lowercased email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Option<Self> {
        validate_email(raw).map(Email)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Email::parse(&value).ok_or(FieldError::Email(value))
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// First and last name, both non-empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "NameParts")]
pub struct PersonName {
    first: String,
    last: String,
}

/// Unchecked wire form of [`PersonName`]
#[derive(Deserialize)]
pub struct NameParts {
    pub first: String,
    pub last: String,
}

impl PersonName {
    /// Build from separately edited parts; both must be non-empty after trimming
    pub fn new(first: &str, last: &str) -> Result<Self, FieldError> {
        let (first, last) = (first.trim(), last.trim());
        if first.is_empty() || last.is_empty() {
            return Err(FieldError::Name(format!("{} {}", first, last).trim().to_string()));
        }
        Ok(PersonName {
            first: first.to_string(),
            last: last.to_string(),
        })
    }

    /// Run recognised full-name text through the name parser
    pub fn parse(full_name: &str) -> Option<Self> {
        parse_name(full_name).map(|(first, last)| PersonName { first, last })
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn last(&self) -> &str {
        &self.last
    }

    /// "first last", as used for similarity comparisons
    pub fn full(&self) -> String {
        format!("{} {}", self.first, self.last)
    }
}

impl TryFrom<NameParts> for PersonName {
    type Error = FieldError;

    fn try_from(parts: NameParts) -> Result<Self, Self::Error> {
        PersonName::new(&parts.first, &parts.last)
    }
}

/// Positional bundle of raw entity values believed to describe one contact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateRecord {
    pub name: Option<String>,
    pub mobile: Option<String>,
    pub landline: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<String>,
    pub last_seen_date: Option<String>,
}

impl CandidateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the value for a field type; `Other` is ignored
    pub fn set(&mut self, entity_type: EntityType, value: &str) {
        let slot = match entity_type {
            EntityType::Name => &mut self.name,
            EntityType::Mobile => &mut self.mobile,
            EntityType::Landline => &mut self.landline,
            EntityType::Address => &mut self.address,
            EntityType::Email => &mut self.email,
            EntityType::DateOfBirth => &mut self.date_of_birth,
            EntityType::LastSeen => &mut self.last_seen_date,
            EntityType::Other => return,
        };
        *slot = Some(value.to_string());
    }

    pub fn with(mut self, entity_type: EntityType, value: &str) -> Self {
        self.set(entity_type, value);
        self
    }

    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

/// A validated contact; name, mobile and address are guaranteed by their types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: Uuid,
    pub job_id: Option<Uuid>,
    pub source_file: Option<String>,
    pub name: PersonName,
    pub mobile: PhoneNumber,
    pub landline: Option<PhoneNumber>,
    pub address: Address,
    pub email: Option<Email>,
    pub date_of_birth: Option<String>,
    pub last_seen_date: Option<String>,
    pub is_duplicate: bool,
    pub is_valid: bool,
    pub is_reviewed: bool,
    pub reviewer_notes: Option<String>,
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactRecord {
    pub fn new(name: PersonName, mobile: PhoneNumber, address: Address) -> Self {
        let now = Utc::now();
        ContactRecord {
            id: Uuid::new_v4(),
            job_id: None,
            source_file: None,
            name,
            mobile,
            landline: None,
            address,
            email: None,
            date_of_birth: None,
            last_seen_date: None,
            is_duplicate: false,
            is_valid: true,
            is_reviewed: false,
            reviewer_notes: None,
            confidence_score: DEFAULT_CONFIDENCE,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_landline(mut self, landline: Option<PhoneNumber>) -> Self {
        self.landline = landline;
        self
    }

    pub fn with_email(mut self, email: Option<Email>) -> Self {
        self.email = email;
        self
    }

    pub fn with_dates(mut self, date_of_birth: Option<String>, last_seen_date: Option<String>) -> Self {
        self.date_of_birth = date_of_birth.filter(|d| !d.is_empty());
        self.last_seen_date = last_seen_date.filter(|d| !d.is_empty());
        self
    }

    pub fn with_source(mut self, source_file: &str, job_id: Uuid) -> Self {
        self.source_file = Some(source_file.to_string());
        self.job_id = Some(job_id);
        self
    }

    pub fn first_name(&self) -> &str {
        self.name.first()
    }

    pub fn last_name(&self) -> &str {
        self.name.last()
    }
}

/// Manual review edit. `None` leaves a field alone; an empty string clears an
/// optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub mobile: Option<String>,
    pub landline: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<String>,
    pub last_seen_date: Option<String>,
    pub is_valid: Option<bool>,
    pub is_reviewed: Option<bool>,
    pub reviewer_notes: Option<String>,
}

impl RecordUpdate {
    /// Apply the edit. Nothing is changed if any edited field is invalid.
    pub fn apply(&self, record: &mut ContactRecord) -> Result<(), FieldError> {
        let name = match (&self.first_name, &self.last_name) {
            (None, None) => record.name.clone(),
            (first, last) => PersonName::new(
                first.as_deref().unwrap_or(record.first_name()),
                last.as_deref().unwrap_or(record.last_name()),
            )?,
        };

        let mobile = match &self.mobile {
            Some(raw) => PhoneNumber::parse(raw).ok_or_else(|| FieldError::Phone(raw.clone()))?,
            None => record.mobile.clone(),
        };

        let address = match &self.address {
            Some(raw) => Address::parse(raw).ok_or_else(|| FieldError::Address(raw.clone()))?,
            None => record.address.clone(),
        };

        let landline = match self.landline.as_deref().map(str::trim) {
            Some("") => None,
            Some(raw) => Some(PhoneNumber::parse(raw).ok_or_else(|| FieldError::Phone(raw.to_string()))?),
            None => record.landline.clone(),
        };

        let email = match self.email.as_deref().map(str::trim) {
            Some("") => None,
            Some(raw) => Some(Email::parse(raw).ok_or_else(|| FieldError::Email(raw.to_string()))?),
            None => record.email.clone(),
        };

        record.name = name;
        record.mobile = mobile;
        record.address = address;
        record.landline = landline;
        record.email = email;

        if let Some(dob) = &self.date_of_birth {
            record.date_of_birth = Some(dob.trim().to_string()).filter(|d| !d.is_empty());
        }
        if let Some(last_seen) = &self.last_seen_date {
            record.last_seen_date = Some(last_seen.trim().to_string()).filter(|d| !d.is_empty());
        }
        if let Some(is_valid) = self.is_valid {
            record.is_valid = is_valid;
        }
        if let Some(is_reviewed) = self.is_reviewed {
            record.is_reviewed = is_reviewed;
        }
        if let Some(notes) = &self.reviewer_notes {
            record.reviewer_notes = Some(notes.clone()).filter(|n| !n.is_empty());
        }

        record.updated_at = Utc::now();
        Ok(())
    }
}

/// Record counts for a job, or for everything when no job is given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordsSummary {
    pub total: i64,
    pub valid: i64,
    pub invalid: i64,
    pub duplicates: i64,
    pub reviewed: i64,
    pub unreviewed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ContactRecord {
        ContactRecord::new(
            PersonName::parse("John Smith").unwrap(),
            PhoneNumber::parse("0412 345 678").unwrap(),
            Address::parse("12 Example Street Brisbane").unwrap(),
        )
    }

    #[test]
    fn test_new_record_defaults() {
        let record = sample_record();
        assert_eq!(record.first_name(), "John");
        assert_eq!(record.last_name(), "Smith");
        assert_eq!(record.mobile.as_str(), "0412345678");
        assert!(!record.is_duplicate);
        assert!(record.is_valid);
        assert!(!record.is_reviewed);
        assert_eq!(record.confidence_score, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_candidate_set_and_has_name() {
        let candidate = CandidateRecord::new()
            .with(EntityType::Mobile, "0412345678")
            .with(EntityType::Other, "ignored");
        assert!(!candidate.has_name());
        assert_eq!(candidate.mobile.as_deref(), Some("0412345678"));

        let candidate = candidate.with(EntityType::Name, "Jane Doe");
        assert!(candidate.has_name());
    }

    #[test]
    fn test_deserialize_enforces_rules() {
        assert!(serde_json::from_str::<PhoneNumber>("\"04 1234 5678\"").is_ok());
        assert!(serde_json::from_str::<PhoneNumber>("\"12345\"").is_err());
        assert!(serde_json::from_str::<Address>("\"Main Street\"").is_err());
        assert!(serde_json::from_str::<PersonName>(r#"{"first": "", "last": "Smith"}"#).is_err());
    }

    #[test]
    fn test_update_applies_edits() {
        let mut record = sample_record();
        let update = RecordUpdate {
            last_name: Some("Smythe".to_string()),
            email: Some("John@Example.com".to_string()),
            is_reviewed: Some(true),
            reviewer_notes: Some("checked against source".to_string()),
            ..Default::default()
        };

        update.apply(&mut record).unwrap();
        assert_eq!(record.first_name(), "John");
        assert_eq!(record.last_name(), "Smythe");
        assert_eq!(record.email.as_ref().map(Email::as_str), Some("john@example.com"));
        assert!(record.is_reviewed);

        let clear = RecordUpdate {
            email: Some(String::new()),
            ..Default::default()
        };
        clear.apply(&mut record).unwrap();
        assert!(record.email.is_none());
    }

    #[test]
    fn test_invalid_update_changes_nothing() {
        let mut record = sample_record();
        let update = RecordUpdate {
            first_name: Some("Jack".to_string()),
            mobile: Some("123".to_string()),
            ..Default::default()
        };

        assert_eq!(update.apply(&mut record), Err(FieldError::Phone("123".to_string())));
        assert_eq!(record.first_name(), "John");
        assert_eq!(record.mobile.as_str(), "0412345678");
    }
}
