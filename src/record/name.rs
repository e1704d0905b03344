//! Splitting recognised name text into first and last name.
//!
//! Recognition output regularly labels street fragments or id numbers as
//! names, so every rule here rejects rather than guesses. A rejected name
//! sinks the whole candidate record.

use tracing::debug;

use super::TARGET_RECORD;

/// Characters that separate alternative renderings of one name ("Smith, John")
const SEGMENT_SEPARATORS: [char; 4] = [';', ',', '/', '\\'];

/// Trimmed from both ends of a token before deciding whether it is junk
const JUNK_PUNCTUATION: &[char] = &[
    ' ', ',', '.', ';', ':', '-', '_', '(', ')', '[', ']', '{', '}', '"', '\'', '`',
];

/// Words that mark the text as part of an address rather than a person
const ADDRESS_WORDS: [&str; 21] = [
    "street", "avenue", "road", "drive", "lane", "court", "place", "way", "crescent", "close",
    "terrace", "parade", "boulevard", "qld", "nsw", "vic", "wa", "sa", "tas", "nt", "act",
];

/// Minimum Latin letters a first name must contain
const MIN_FIRST_NAME_LETTERS: usize = 2;

/// Parse a full name into `(first_name, last_name)`.
///
/// Returns `None` whenever the text does not look like a person's name.
pub fn parse_name(full_name: &str) -> Option<(String, String)> {
    let name = full_name.trim();
    if name.is_empty() {
        return None;
    }

    let name = best_segment(name);

    let tokens: Vec<&str> = name
        .split_whitespace()
        .skip_while(|token| is_junk_token(token))
        .collect();
    let name = tokens.join(" ");
    if name.is_empty() {
        return None;
    }

    if contains_digit(&name) {
        debug!(target: TARGET_RECORD, "Rejected name '{}': contains digits", name);
        return None;
    }

    let lowered = name.to_lowercase();
    if let Some(word) = ADDRESS_WORDS
        .iter()
        .find(|word| lowered.split(' ').any(|token| token == **word))
    {
        debug!(
            target: TARGET_RECORD,
            "Rejected name '{}': looks like an address ('{}')", name, word
        );
        return None;
    }

    if tokens.len() < 2 {
        return None;
    }

    let first_name = tokens[0].to_string();
    let last_name = tokens[1..].join(" ");

    if contains_digit(&first_name) || contains_digit(&last_name) {
        return None;
    }

    if latin_letter_count(&first_name) < MIN_FIRST_NAME_LETTERS {
        debug!(
            target: TARGET_RECORD,
            "Rejected name '{}': first name '{}' too short", name, first_name
        );
        return None;
    }

    Some((first_name, last_name))
}

/// When the text holds several separator-delimited segments, pick the one
/// with the most Latin letters (then the longest; earliest wins ties).
fn best_segment(name: &str) -> &str {
    if !name.contains(SEGMENT_SEPARATORS) {
        return name;
    }

    let mut segments = name.split(SEGMENT_SEPARATORS);
    let mut best = segments.next().unwrap_or(name);
    let mut best_key = segment_key(best);

    for segment in segments {
        let segment = segment.trim_start();
        let key = segment_key(segment);
        if key > best_key {
            best = segment;
            best_key = key;
        }
    }

    if latin_letter_count(best) >= 1 || best.split_whitespace().count() >= 2 {
        best.trim()
    } else {
        name
    }
}

fn segment_key(segment: &str) -> (usize, usize) {
    (latin_letter_count(segment), segment.chars().count())
}

fn is_junk_token(token: &str) -> bool {
    let stripped = token.trim_matches(JUNK_PUNCTUATION);
    stripped.is_empty() || !stripped.chars().any(|c| c.is_ascii_alphanumeric())
}

fn latin_letter_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_ascii_alphabetic()).count()
}

fn contains_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}
