use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use super::types::{Address, CandidateRecord, ContactRecord, Email, PersonName, PhoneNumber};
use super::TARGET_RECORD;
use crate::entity::normalizer::normalize_optional;
use crate::entity::{EntityType, ExtractedEntities};

/// Why a candidate did not become a contact record. This is normal
/// filtering, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingName,
    InvalidName,
    InvalidMobile,
    InvalidAddress,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingName => write!(f, "no name"),
            Rejection::InvalidName => write!(f, "name did not parse"),
            Rejection::InvalidMobile => write!(f, "missing or invalid mobile"),
            Rejection::InvalidAddress => write!(f, "missing or implausible address"),
        }
    }
}

/// Zip entities into candidates by position: the i-th name goes with the
/// i-th mobile, the i-th address and so on.
///
/// Candidates without a name are dropped. When the per-type counts differ
/// the pairing is lossy and can misattribute fields; that is accepted.
pub fn group_entities(extracted: &ExtractedEntities) -> Vec<CandidateRecord> {
    let by_type: HashMap<EntityType, Vec<&str>> = EntityType::FIELDS
        .iter()
        .map(|entity_type| (*entity_type, extracted.values_of(*entity_type)))
        .collect();

    let count = |entity_type: EntityType| by_type.get(&entity_type).map_or(0, Vec::len);

    info!(
        target: TARGET_RECORD,
        "Found: {} names, {} mobiles, {} addresses, {} emails",
        count(EntityType::Name),
        count(EntityType::Mobile),
        count(EntityType::Address),
        count(EntityType::Email)
    );

    let max_count = by_type.values().map(Vec::len).max().unwrap_or(0);

    (0..max_count)
        .map(|i| {
            let mut candidate = CandidateRecord::new();
            for (entity_type, values) in &by_type {
                if let Some(value) = values.get(i) {
                    candidate.set(*entity_type, value);
                }
            }
            candidate
        })
        .filter(CandidateRecord::has_name)
        .collect()
}

/// Validate one candidate into a contact record.
///
/// Name, mobile and address are each mandatory; landline and email are
/// dropped silently when they do not validate.
pub fn assemble_candidate(candidate: &CandidateRecord) -> Result<ContactRecord, Rejection> {
    let clean = |value: &Option<String>| normalize_optional(value.as_deref());

    let raw_name = clean(&candidate.name);
    if raw_name.is_empty() {
        return Err(Rejection::MissingName);
    }
    let name = PersonName::parse(&raw_name).ok_or(Rejection::InvalidName)?;

    let mobile = PhoneNumber::parse(&clean(&candidate.mobile)).ok_or(Rejection::InvalidMobile)?;
    let landline = PhoneNumber::parse(&clean(&candidate.landline));
    let email = Email::parse(&clean(&candidate.email));
    let address = Address::parse(&clean(&candidate.address)).ok_or(Rejection::InvalidAddress)?;

    let record = ContactRecord::new(name, mobile, address)
        .with_landline(landline)
        .with_email(email)
        .with_dates(
            Some(clean(&candidate.date_of_birth)),
            Some(clean(&candidate.last_seen_date)),
        );

    Ok(record)
}

/// Turn one document's entities into validated contact records, in order
pub fn assemble(extracted: &ExtractedEntities) -> Vec<ContactRecord> {
    let candidates = group_entities(extracted);
    let candidate_count = candidates.len();

    let records: Vec<ContactRecord> = candidates
        .iter()
        .filter_map(|candidate| match assemble_candidate(candidate) {
            Ok(record) => Some(record),
            Err(rejection) => {
                debug!(
                    target: TARGET_RECORD,
                    "Dropped candidate {:?}: {}",
                    candidate.name.as_deref().unwrap_or_default(),
                    rejection
                );
                None
            }
        })
        .collect();

    debug!(
        target: TARGET_RECORD,
        "Accepted {} of {} candidates", records.len(), candidate_count
    );

    records
}
