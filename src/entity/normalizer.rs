use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Punctuation that survives cleaning; everything else non-alphanumeric is dropped
const KEPT_PUNCTUATION: [char; 7] = ['-', '.', ',', '@', '(', ')', '/'];

/// Clean raw recognition text before it is used anywhere else.
///
/// Decomposes the text, drops combining marks (so "José" becomes "Jose"),
/// removes emoji and pictograph ranges, keeps only alphanumerics, whitespace
/// and `- . , @ ( ) /`, then collapses whitespace runs to single spaces.
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !is_pictograph(*c))
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || KEPT_PUNCTUATION.contains(c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Same as [`normalize_text`] but for optional input
pub fn normalize_optional(text: Option<&str>) -> String {
    text.map(normalize_text).unwrap_or_default()
}

// Emoticons, pictographs, transport symbols, flags, dingbats and the enclosed
// character block, matching what recognition output tends to carry.
fn is_pictograph(c: char) -> bool {
    matches!(
        c as u32,
        0x1F600..=0x1F64F
            | 0x1F300..=0x1F5FF
            | 0x1F680..=0x1F6FF
            | 0x1F1E0..=0x1F1FF
            | 0x2702..=0x27B0
            | 0x24C2..=0x1F251
    )
}
