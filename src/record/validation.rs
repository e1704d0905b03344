use lazy_static::lazy_static;
use regex::Regex;

/// Phone numbers must have exactly this many digits once separators are removed
pub const PHONE_DIGITS: usize = 10;

/// Shortest address (in characters) considered plausible
pub const MIN_ADDRESS_LEN: usize = 15;

/// A street number has to show up within this many leading characters
pub const ADDRESS_NUMBER_WINDOW: usize = 10;

lazy_static! {
    static ref AU_MOBILE: Regex = Regex::new(r"^04\d{8}$").unwrap();
}

/// Strip every non-digit and accept only a 10-digit result.
///
/// Used for both mobile and landline numbers.
pub fn validate_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == PHONE_DIGITS {
        Some(digits)
    } else {
        None
    }
}

/// Accept an address that is long enough and starts with something numeric.
///
/// The trimmed text must be at least 15 characters and carry a digit in its
/// first 10 characters; the trimmed text is returned unchanged.
pub fn validate_address(raw: &str) -> Option<String> {
    let address = raw.trim();
    if address.chars().count() < MIN_ADDRESS_LEN {
        return None;
    }

    let has_number = address
        .chars()
        .take(ADDRESS_NUMBER_WINDOW)
        .any(|c| c.is_ascii_digit());

    if has_number {
        Some(address.to_string())
    } else {
        None
    }
}

/// Accept an email with an `@` whose domain part (after the last `@`) has a dot.
pub fn validate_email(raw: &str) -> Option<String> {
    let email = raw.trim();
    let (_, domain) = email.rsplit_once('@')?;
    if domain.contains('.') {
        Some(email.to_lowercase())
    } else {
        None
    }
}

/// Whether a phone number is in Australian mobile format (`04` + 8 digits)
pub fn is_australian_mobile(phone: &str) -> bool {
    if phone.is_empty() {
        return false;
    }
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    AU_MOBILE.is_match(&digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_digit_count() {
        assert_eq!(validate_phone("04-1234-5678"), Some("0412345678".to_string()));
        assert_eq!(validate_phone("(02) 9876 5432"), Some("0298765432".to_string()));
        assert_eq!(validate_phone("0412 345 67"), None);
        assert_eq!(validate_phone("+61 412 345 678"), None);
        assert_eq!(validate_phone(""), None);
        assert_eq!(validate_phone("no digits"), None);
    }

    #[test]
    fn test_phone_output_is_ten_digits_or_nothing() {
        for raw in ["0412345678", "04 1234 5678 9", "1", "ph: 03-9999-0000", "abc"] {
            if let Some(phone) = validate_phone(raw) {
                assert_eq!(phone.len(), PHONE_DIGITS);
                assert!(phone.chars().all(|c| c.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn test_address_rules() {
        assert_eq!(
            validate_address("123 Main Street Springfield"),
            Some("123 Main Street Springfield".to_string())
        );
        assert_eq!(validate_address("Main Street"), None);
        // Long enough, but the number comes too late
        assert_eq!(validate_address("Somewhere Lane 42 Springfield"), None);
        // Digit present but too short
        assert_eq!(validate_address("1 Main St"), None);
        assert_eq!(
            validate_address("   Unit 5/12 Long Road   "),
            Some("Unit 5/12 Long Road".to_string())
        );
    }

    #[test]
    fn test_email_rules() {
        assert_eq!(
            validate_email("  John.Smith@Example.COM "),
            Some("john.smith@example.com".to_string())
        );
        assert_eq!(validate_email("john@localhost"), None);
        assert_eq!(validate_email("john.smith.example.com"), None);
        assert_eq!(validate_email("a.b@c@domain"), None);
        assert_eq!(validate_email("a@b.c@domain.org"), Some("a@b.c@domain.org".to_string()));
    }

    #[test]
    fn test_australian_mobile() {
        assert!(is_australian_mobile("0412345678"));
        assert!(is_australian_mobile("04 1234 5678"));
        assert!(!is_australian_mobile("0298765432"));
        assert!(!is_australian_mobile("041234567"));
        assert!(!is_australian_mobile(""));
    }
}
