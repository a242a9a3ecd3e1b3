//! Property-style tests for payload normalization.
//!
//! These exercise `scan_core::normalize` through the public API over a
//! spread of awkward inputs: mixed case, punctuation, URLs, control
//! characters, non-ASCII text, and payloads far longer than the cap.
//! Every input must satisfy the same four properties:
//!
//! 1. idempotence: `normalize(normalize(s)) == normalize(s)`
//! 2. the output contains only `A-Z` and `0-9`
//! 3. the output is at most 64 characters long
//! 4. every ASCII alphanumeric of the input survives, uppercased, in order
//!    (up to the cap)

use scan_core::{normalize, NormalizedCode, MAX_CODE_LEN};

fn samples() -> Vec<String> {
    vec![
        String::new(),
        " ".to_string(),
        "8jkh3b4o ".to_string(),
        "8JKH3B4O".to_string(),
        "https://school.example/badge?id=QR100&v=2".to_string(),
        "\u{0}\u{7}tab\there\r\n".to_string(),
        "Ünïcödé-ßtraße-42".to_string(),
        "🙂 QR-101 🙂".to_string(),
        "x".repeat(65),
        "ab-".repeat(100),
        "9".repeat(1000),
    ]
}

#[test]
fn test_normalize_is_idempotent() {
    for s in samples() {
        let once = normalize(&s);
        assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
    }
}

#[test]
fn test_normalize_output_is_uppercase_alphanumeric() {
    for s in samples() {
        let out = normalize(&s);
        assert!(
            out.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
            "unexpected character in {out:?} (from {s:?})"
        );
    }
}

#[test]
fn test_normalize_output_is_capped() {
    for s in samples() {
        assert!(normalize(&s).chars().count() <= MAX_CODE_LEN, "too long for {s:?}");
    }
}

#[test]
fn test_normalize_preserves_ascii_alphanumerics_in_order() {
    for s in samples() {
        let expected: String = s
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .take(MAX_CODE_LEN)
            .collect();
        // Non-ASCII letters whose uppercase is ASCII may add characters, so
        // compare as a subsequence.
        let out = normalize(&s);
        let mut rest = out.chars();
        assert!(
            expected.chars().all(|c| rest.any(|o| o == c)) || out.len() == MAX_CODE_LEN,
            "{expected:?} is not a subsequence of {out:?}"
        );
    }
}

#[test]
fn test_scenario_badge_with_trailing_space() {
    let code = NormalizedCode::new("8jkh3b4o ");
    assert_eq!(code.as_str(), "8JKH3B4O");
}
