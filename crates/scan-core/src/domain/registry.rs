//! Roster lookup collaborator.
//!
//! The scan engine does not own the student list.  It only asks two
//! questions of it, both synchronously and only on the accept path:
//!
//! - Is this normalized code a known badge?
//! - What name should the welcome banner show for it?
//!
//! The roster itself (merit totals, attendance logs, CRUD forms) lives
//! elsewhere; [`StudentRegistry`] is the in-memory implementation the kiosk
//! loads from its configuration file.

use std::collections::HashMap;

use crate::domain::code::NormalizedCode;

/// Maps normalized codes to display names.
pub trait RegistryLookup: Send + Sync {
    /// Returns `true` if `code` belongs to a registered badge.
    fn contains(&self, code: &NormalizedCode) -> bool;

    /// Returns the display name registered for `code`, if any.
    fn display_name(&self, code: &NormalizedCode) -> Option<String>;
}

/// In-memory roster keyed by normalized code.
///
/// Keys are normalized on insert, so `"8jkh-3b4o"` and `"8JKH3B4O"` refer
/// to the same badge.
#[derive(Debug, Default, Clone)]
pub struct StudentRegistry {
    students: HashMap<NormalizedCode, String>,
}

impl StudentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from `(code, name)` pairs.
    pub fn from_entries<I, C, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (C, N)>,
        C: AsRef<str>,
        N: Into<String>,
    {
        let mut registry = Self::new();
        for (code, name) in entries {
            registry.insert(code.as_ref(), name);
        }
        registry
    }

    /// Registers or renames a badge.  Codes that normalize to empty are ignored.
    pub fn insert(&mut self, code: &str, name: impl Into<String>) {
        let code = NormalizedCode::new(code);
        if !code.is_empty() {
            self.students.insert(code, name.into());
        }
    }

    /// Removes a badge from the roster.
    pub fn remove(&mut self, code: &str) {
        self.students.remove(&NormalizedCode::new(code));
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}

impl RegistryLookup for StudentRegistry {
    fn contains(&self, code: &NormalizedCode) -> bool {
        self.students.contains_key(code)
    }

    fn display_name(&self, code: &NormalizedCode) -> Option<String> {
        self.students.get(code).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_starts_empty() {
        let registry = StudentRegistry::new();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insert_normalizes_key() {
        // Arrange
        let mut registry = StudentRegistry::new();

        // Act
        registry.insert("8jkh-3b4o", "John Doe");

        // Assert
        let code = NormalizedCode::new("8JKH3B4O");
        assert!(registry.contains(&code));
        assert_eq!(registry.display_name(&code).as_deref(), Some("John Doe"));
    }

    #[test]
    fn test_insert_ignores_codes_that_normalize_to_empty() {
        let mut registry = StudentRegistry::new();
        registry.insert("---", "Nobody");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_entries_and_remove() {
        let mut registry =
            StudentRegistry::from_entries([("QR100", "Student 1"), ("QR101", "Student 2")]);
        assert_eq!(registry.len(), 2);

        registry.remove("qr100");

        assert!(!registry.contains(&NormalizedCode::new("QR100")));
        assert!(registry.contains(&NormalizedCode::new("QR101")));
    }

    #[test]
    fn test_unknown_code_has_no_display_name() {
        let registry = StudentRegistry::from_entries([("QR100", "Student 1")]);
        assert_eq!(registry.display_name(&NormalizedCode::new("QR999")), None);
    }
}
