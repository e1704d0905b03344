pub mod similarity;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::record::validation::is_australian_mobile;
use crate::record::ContactRecord;

pub use similarity::{calculate_similarity, string_similarity};

pub const TARGET_DUPLICATE: &str = "duplicate";

/// Default score for [`DuplicateDetector::similar_records`]
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Records sharing one mobile number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub mobile_number: String,
    pub records: Vec<ContactRecord>,
}

impl DuplicateGroup {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// The member kept as the non-duplicate
    pub fn canonical(&self) -> Option<&ContactRecord> {
        self.records.iter().find(|r| !r.is_duplicate)
    }

    pub fn record_ids(&self) -> Vec<Uuid> {
        self.records.iter().map(|r| r.id).collect()
    }
}

/// A record from a pool together with its similarity to the probe record
#[derive(Debug, Clone, Copy)]
pub struct SimilarRecord<'a> {
    pub record: &'a ContactRecord,
    pub score: f64,
}

/// Batch duplicate detection over one job's records. Holds no state between
/// calls, so running it again over the same records gives the same flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct DuplicateDetector;

impl DuplicateDetector {
    pub fn new() -> Self {
        Self
    }

    /// Flag every record after the first in each mobile-number group.
    ///
    /// Only Australian mobile numbers (`04` + 8 digits) take part. Returns how
    /// many records were marked as duplicates.
    pub fn detect_duplicates(&self, records: &mut [ContactRecord]) -> usize {
        info!(
            target: TARGET_DUPLICATE,
            "Detecting duplicates in {} records", records.len()
        );

        let mut duplicate_count = 0;
        for (_, members) in group_by_mobile(records) {
            if members.len() < 2 {
                continue;
            }
            for (position, index) in members.into_iter().enumerate() {
                let is_duplicate = position > 0;
                records[index].is_duplicate = is_duplicate;
                if is_duplicate {
                    duplicate_count += 1;
                }
            }
        }

        info!(
            target: TARGET_DUPLICATE,
            "Found {} duplicate records", duplicate_count
        );
        duplicate_count
    }

    /// Groups of two or more records sharing a mobile number, in order of
    /// first appearance. Flags are left untouched.
    pub fn duplicate_groups(&self, records: &[ContactRecord]) -> Vec<DuplicateGroup> {
        group_by_mobile(records)
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(mobile_number, members)| DuplicateGroup {
                mobile_number,
                records: members.into_iter().map(|i| records[i].clone()).collect(),
            })
            .collect()
    }

    /// Keep `keep_record_id` and mark every other member as a duplicate.
    ///
    /// Returns `false`, changing nothing, if the group is empty or the record
    /// is not a member.
    pub fn resolve_duplicates(&self, group: &mut DuplicateGroup, keep_record_id: Uuid) -> bool {
        if !group.records.iter().any(|r| r.id == keep_record_id) {
            debug!(
                target: TARGET_DUPLICATE,
                "Record {} is not part of the group for {}", keep_record_id, group.mobile_number
            );
            return false;
        }

        for record in &mut group.records {
            record.is_duplicate = record.id != keep_record_id;
        }
        true
    }

    /// Records from `pool` scoring at least `threshold` against `record`,
    /// best first. The record itself is skipped.
    pub fn similar_records<'a>(
        &self,
        record: &ContactRecord,
        pool: &'a [ContactRecord],
        threshold: f64,
    ) -> Vec<SimilarRecord<'a>> {
        let mut similar: Vec<SimilarRecord<'a>> = pool
            .iter()
            .filter(|other| other.id != record.id)
            .map(|other| SimilarRecord {
                record: other,
                score: calculate_similarity(record, other),
            })
            .filter(|candidate| candidate.score >= threshold)
            .collect();

        similar.sort_by(|a, b| b.score.total_cmp(&a.score));
        similar
    }
}

/// Indices of records per Australian mobile number, in first-seen order
fn group_by_mobile(records: &[ContactRecord]) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        let mobile = record.mobile.as_str();
        if !is_australian_mobile(mobile) {
            continue;
        }
        match positions.get(mobile) {
            Some(&position) => groups[position].1.push(index),
            None => {
                positions.insert(mobile, groups.len());
                groups.push((mobile.to_string(), vec![index]));
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Address, Email, PersonName, PhoneNumber};

    fn record(name: &str, mobile: &str) -> ContactRecord {
        ContactRecord::new(
            PersonName::parse(name).unwrap(),
            PhoneNumber::parse(mobile).unwrap(),
            Address::parse("12 Example Street Brisbane").unwrap(),
        )
    }

    fn flags(records: &[ContactRecord]) -> Vec<bool> {
        records.iter().map(|r| r.is_duplicate).collect()
    }

    #[test]
    fn test_detect_marks_all_but_first() {
        let mut records = vec![
            record("John Smith", "0412345678"),
            record("Johnny Smith", "0412345678"),
            record("Mary Jones", "0499999999"),
        ];

        let detector = DuplicateDetector::new();
        assert_eq!(detector.detect_duplicates(&mut records), 1);
        assert_eq!(flags(&records), vec![false, true, false]);
    }

    #[test]
    fn test_detect_is_idempotent() {
        let mut records = vec![
            record("John Smith", "0412345678"),
            record("Mary Jones", "0499999999"),
            record("John Smith", "0412345678"),
            record("Mary Jones", "0499999999"),
            record("Mary Jones", "0499999999"),
        ];

        let detector = DuplicateDetector::new();
        let first = detector.detect_duplicates(&mut records);
        let first_flags = flags(&records);
        let second = detector.detect_duplicates(&mut records);

        assert_eq!(first, 3);
        assert_eq!(first, second);
        assert_eq!(first_flags, flags(&records));
        assert_eq!(first_flags, vec![false, false, true, true, true]);
    }

    #[test]
    fn test_non_mobile_numbers_never_flagged() {
        let mut records = vec![
            record("John Smith", "0298765432"),
            record("John Smith", "0298765432"),
        ];

        let detector = DuplicateDetector::new();
        assert_eq!(detector.detect_duplicates(&mut records), 0);
        assert_eq!(flags(&records), vec![false, false]);
        assert!(detector.duplicate_groups(&records).is_empty());
    }

    #[test]
    fn test_duplicate_groups_do_not_mutate() {
        let records = vec![
            record("John Smith", "0412345678"),
            record("Mary Jones", "0499999999"),
            record("Johnny Smith", "0412345678"),
        ];

        let groups = DuplicateDetector::new().duplicate_groups(&records);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].mobile_number, "0412345678");
        assert_eq!(groups[0].record_ids(), vec![records[0].id, records[2].id]);
        assert_eq!(flags(&records), vec![false, false, false]);
    }

    #[test]
    fn test_resolve_duplicates() {
        let mut records = vec![
            record("John Smith", "0412345678"),
            record("Johnny Smith", "0412345678"),
            record("Jo Smithers", "0412345678"),
        ];
        let detector = DuplicateDetector::new();
        detector.detect_duplicates(&mut records);

        let mut group = detector.duplicate_groups(&records).remove(0);
        let keep = records[1].id;
        assert!(detector.resolve_duplicates(&mut group, keep));
        assert_eq!(flags(&group.records), vec![true, false, true]);
        assert_eq!(group.canonical().map(|r| r.id), Some(keep));

        assert!(!detector.resolve_duplicates(&mut group, Uuid::new_v4()));
        assert_eq!(flags(&group.records), vec![true, false, true]);

        let mut empty = DuplicateGroup {
            mobile_number: "0412345678".to_string(),
            records: Vec::new(),
        };
        assert!(!detector.resolve_duplicates(&mut empty, keep));
    }

    #[test]
    fn test_similar_records_sorted_and_filtered() {
        let probe = record("John Smith", "0412345678").with_email(Email::parse("js@example.com"));
        let pool = vec![
            probe.clone(),
            record("Mary Jones", "0499999999"),
            record("John Smith", "0412345678").with_email(Email::parse("john@example.com")),
            record("John Smith", "0412345678"),
            record("John Smithers", "0412345678"),
        ];

        let similar = DuplicateDetector::new().similar_records(&probe, &pool, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].record.id, pool[3].id);
        assert_eq!(similar[0].score, 1.0);
        assert_eq!(similar[1].record.id, pool[2].id);
        assert!((similar[1].score - 0.9).abs() < 1e-12);
    }
}
