use std::collections::HashSet;

use crate::record::ContactRecord;

// Field weights for the composite score
pub const MOBILE_WEIGHT: f64 = 0.4;
pub const NAME_WEIGHT: f64 = 0.3;
pub const ADDRESS_WEIGHT: f64 = 0.2;
pub const EMAIL_WEIGHT: f64 = 0.1;

/// Jaccard similarity of the whitespace-separated word sets.
///
/// Two empty inputs are identical (1.0); one empty input shares nothing (0.0).
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();

    match (words_a.is_empty(), words_b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => {
            let intersection = words_a.intersection(&words_b).count();
            let union = words_a.union(&words_b).count();
            intersection as f64 / union as f64
        }
    }
}

/// Weighted similarity of two records in `0.0..=1.0`.
///
/// Mobile (0.4) and email (0.1) count only on exact match; name (0.3) and
/// address (0.2) are scaled by word-set similarity. A field missing on
/// either side is left out of both the score and the total weight.
pub fn calculate_similarity(a: &ContactRecord, b: &ContactRecord) -> f64 {
    let mut score = 0.0;
    let mut total_weight = 0.0;

    let mut exact = |left: Option<String>, right: Option<String>, weight: f64| {
        if let (Some(left), Some(right)) = (left, right) {
            if left == right {
                score += weight;
            }
            total_weight += weight;
        }
    };
    exact(comparable(a.mobile.as_str()), comparable(b.mobile.as_str()), MOBILE_WEIGHT);
    exact(
        a.email.as_ref().and_then(|e| comparable(e.as_str())),
        b.email.as_ref().and_then(|e| comparable(e.as_str())),
        EMAIL_WEIGHT,
    );

    let fuzzy_pairs = [
        (comparable(&a.name.full()), comparable(&b.name.full()), NAME_WEIGHT),
        (comparable(a.address.as_str()), comparable(b.address.as_str()), ADDRESS_WEIGHT),
    ];
    for (left, right, weight) in fuzzy_pairs {
        if let (Some(left), Some(right)) = (left, right) {
            score += string_similarity(&left, &right) * weight;
            total_weight += weight;
        }
    }

    if total_weight > 0.0 {
        score / total_weight
    } else {
        0.0
    }
}

/// Lowercased, trimmed value; `None` when nothing is left to compare
fn comparable(value: &str) -> Option<String> {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Address, Email, PersonName, PhoneNumber};

    fn record(name: &str, mobile: &str, address: &str) -> ContactRecord {
        ContactRecord::new(
            PersonName::parse(name).unwrap(),
            PhoneNumber::parse(mobile).unwrap(),
            Address::parse(address).unwrap(),
        )
    }

    #[test]
    fn test_string_similarity() {
        assert_eq!(string_similarity("", ""), 1.0);
        assert_eq!(string_similarity("john smith", ""), 0.0);
        assert_eq!(string_similarity("", "john smith"), 0.0);
        assert_eq!(string_similarity("john smith", "smith john"), 1.0);
        assert_eq!(string_similarity("john smith", "john brown"), 1.0 / 3.0);
        assert_eq!(string_similarity("a b c d", "e f"), 0.0);
    }

    #[test]
    fn test_identical_mobile_and_name_different_address() {
        let a = record("John Smith", "0412345678", "12 Example Street Brisbane");
        let b = record("John Smith", "0412345678", "99 Other Road Melbourne");

        let expected = (MOBILE_WEIGHT + NAME_WEIGHT) / (MOBILE_WEIGHT + NAME_WEIGHT + ADDRESS_WEIGHT);
        let score = calculate_similarity(&a, &b);
        assert!((score - expected).abs() < 1e-12);
        assert!((score - 0.7777777777777778).abs() < 1e-9);
    }

    #[test]
    fn test_email_counts_only_when_both_present() {
        let a = record("John Smith", "0412345678", "12 Example Street Brisbane")
            .with_email(Email::parse("john@example.com"));
        let b = record("John Smith", "0412345678", "12 Example Street Brisbane");
        assert_eq!(calculate_similarity(&a, &b), 1.0);

        let c = b.clone().with_email(Email::parse("other@example.com"));
        let score = calculate_similarity(&a, &c);
        assert!((score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_completely_different_records() {
        let a = record("John Smith", "0412345678", "12 Example Street Brisbane");
        let b = record("Mary Jones", "0499999999", "99 Other Road Melbourne");
        assert_eq!(calculate_similarity(&a, &b), 0.0);
    }
}
