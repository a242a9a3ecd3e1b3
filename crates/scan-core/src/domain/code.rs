//! Payload normalization.
//!
//! Every raw decode string is canonicalized before it is compared against
//! the roster: letters are uppercased, everything outside `A-Z0-9` is
//! stripped, and the result is capped at [`MAX_CODE_LEN`] characters.
//!
//! ```text
//! "8jkh3b4o "      ──►  "8JKH3B4O"
//! "ms://8JKH-3B4O" ──►  "MS8JKH3B4O"
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of a normalized code, in characters.
pub const MAX_CODE_LEN: usize = 64;

/// Canonical form of a decoded QR payload.
///
/// Construct with [`NormalizedCode::new`]; the inner string is guaranteed to
/// be uppercase ASCII alphanumerics only and at most [`MAX_CODE_LEN`] long.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedCode(String);

impl NormalizedCode {
    /// Normalizes `raw` into a code.
    pub fn new(raw: &str) -> Self {
        Self(normalize(raw))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if nothing survived normalization.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NormalizedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Uppercases `raw`, strips non-alphanumerics, and truncates to
/// [`MAX_CODE_LEN`] characters.
///
/// Uppercasing happens before filtering, so characters whose uppercase form
/// is ASCII (e.g. `ı` → `I`) survive as their uppercase letter.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_uppercase)
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_CODE_LEN)
        .collect()
}
