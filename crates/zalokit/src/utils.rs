//! Shared helpers: request ids, message sanitization, phone validation

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

/// Maximum message text length after sanitization
pub const MAX_MESSAGE_LENGTH: usize = 2000;

// Vietnamese mobile numbers: 03x/05x/08x/09x, with or without the 84
// country prefix.
static PHONE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"^0[3589]\d{8}$", r"^84[3589]\d{8}$", r"^\+84[3589]\d{8}$"]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

static PHONE_NOISE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[\s\-.]").ok());

/// Generate a unique id for correlating an outbound API call in logs
#[must_use]
pub fn request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Mask sensitive data, keeping only the first and last few characters
#[must_use]
pub fn mask_sensitive(data: &str, visible_chars: usize) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= visible_chars * 2 {
        return "*".repeat(chars.len());
    }

    let head: String = chars[..visible_chars].iter().collect();
    let tail: String = chars[chars.len() - visible_chars..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - visible_chars * 2))
}

/// Sanitize message content: strip null bytes, collapse whitespace, and
/// truncate to `max_length` characters (with a trailing ellipsis)
#[must_use]
pub fn sanitize_message(message: &str, max_length: usize) -> String {
    let cleaned = message.replace('\0', "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_length {
        return collapsed;
    }

    let keep = max_length.saturating_sub(3);
    let truncated: String = collapsed.chars().take(keep).collect();
    format!("{truncated}...")
}

/// Validate a Vietnamese phone number
#[must_use]
pub fn validate_phone(phone: &str) -> bool {
    let cleaned = PHONE_NOISE
        .as_ref()
        .map_or_else(|| phone.to_string(), |re| re.replace_all(phone, "").into_owned());

    PHONE_PATTERNS.iter().any(|pattern| pattern.is_match(&cleaned))
}

/// Normalize a phone number to the local `0`-prefixed form
#[must_use]
pub fn normalize_phone(phone: &str, country_code: &str) -> String {
    let mut cleaned: String = phone.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect();

    if let Some(stripped) = cleaned.strip_prefix('+') {
        cleaned = stripped.to_string();
    }

    if let Some(rest) = cleaned.strip_prefix(country_code) {
        return format!("0{rest}");
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(request_id(), request_id());
    }

    #[test]
    fn mask_keeps_edges() {
        assert_eq!(mask_sensitive("1234567890", 2), "12******90");
        assert_eq!(mask_sensitive("abcd", 2), "****");
    }

    #[test]
    fn sanitize_collapses_whitespace_and_strips_nulls() {
        assert_eq!(sanitize_message("hello\0  world\n\tagain", 2000), "hello world again");
    }

    #[test]
    fn sanitize_truncates_long_messages() {
        let long = "a".repeat(3000);
        let sanitized = sanitize_message(&long, 100);
        assert_eq!(sanitized.chars().count(), 100);
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn phone_validation_accepts_known_formats() {
        assert!(validate_phone("0912345678"));
        assert!(validate_phone("84912345678"));
        assert!(validate_phone("+84 91 234 5678"));
        assert!(validate_phone("091-234-5678"));

        assert!(!validate_phone("12345"));
        assert!(!validate_phone("0112345678"));
        assert!(!validate_phone("not a phone"));
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone("+84912345678", "84"), "0912345678");
        assert_eq!(normalize_phone("84 912 345 678", "84"), "0912345678");
        assert_eq!(normalize_phone("0912345678", "84"), "0912345678");
    }
}
