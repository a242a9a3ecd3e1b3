//! Operator checks that bypass the live camera.
//!
//! - [`manual_check`] answers "is this typed code registered?" without
//!   touching the scan session.
//! - [`decode_still`] runs the stateless frame decoder once over an uploaded
//!   image; a hit is then fed through the normal scan path by the caller.

use scan_core::{Frame, NormalizedCode, RegistryLookup};
use serde::{Deserialize, Serialize};

use crate::infrastructure::decoder::raw::FrameDecoder;

/// Result of a typed-in registration check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum ManualCheck {
    /// The input normalized to nothing.
    EmptyInput,
    Registered { code: NormalizedCode },
    NotFound { code: NormalizedCode },
}

impl ManualCheck {
    pub fn message(&self) -> &'static str {
        match self {
            ManualCheck::EmptyInput => "Enter a code first.",
            ManualCheck::Registered { .. } => "Code is REGISTERED.",
            ManualCheck::NotFound { .. } => "Code not found.",
        }
    }
}

/// Normalizes `input` and looks it up in `registry`.
pub fn manual_check(registry: &dyn RegistryLookup, input: &str) -> ManualCheck {
    let code = NormalizedCode::new(input);
    if code.is_empty() {
        ManualCheck::EmptyInput
    } else if registry.contains(&code) {
        ManualCheck::Registered { code }
    } else {
        ManualCheck::NotFound { code }
    }
}

/// Result of decoding one uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum StillDecode {
    /// Raw payload, before normalization.
    Decoded { payload: String },
    NoCode,
    LibraryMissing,
    /// Pixel buffer does not match its declared dimensions.
    InvalidImage,
}

impl StillDecode {
    pub fn message(&self) -> String {
        match self {
            StillDecode::Decoded { payload } => format!("Decoded: {payload}"),
            StillDecode::NoCode => "No QR found.".to_string(),
            StillDecode::LibraryMissing => "QR decode library missing.".to_string(),
            StillDecode::InvalidImage => "Invalid image.".to_string(),
        }
    }
}

pub fn decode_still(decoder: Option<&dyn FrameDecoder>, frame: &Frame) -> StillDecode {
    let Some(decoder) = decoder else {
        return StillDecode::LibraryMissing;
    };
    if !frame.is_well_formed() {
        return StillDecode::InvalidImage;
    }
    match decoder.decode(frame) {
        Some(payload) => StillDecode::Decoded { payload },
        None => StillDecode::NoCode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;

    use crate::infrastructure::decoder::mock::{payload_frame, MockFrameDecoder};

    mock! {
        Roster {}
        impl RegistryLookup for Roster {
            fn contains(&self, code: &NormalizedCode) -> bool;
            fn display_name(&self, code: &NormalizedCode) -> Option<String>;
        }
    }

    #[test]
    fn test_blank_input_asks_for_a_code() {
        let mut roster = MockRoster::new();
        roster.expect_contains().never();

        let result = manual_check(&roster, "  -- ");

        assert_eq!(result, ManualCheck::EmptyInput);
        assert_eq!(result.message(), "Enter a code first.");
    }

    #[test]
    fn test_registered_code_is_looked_up_normalized() {
        // Arrange
        let mut roster = MockRoster::new();
        roster
            .expect_contains()
            .with(eq(NormalizedCode::new("8JKH3B4O")))
            .times(1)
            .return_const(true);

        // Act
        let result = manual_check(&roster, "8jkh-3b4o");

        // Assert
        assert_eq!(result.message(), "Code is REGISTERED.");
    }

    #[test]
    fn test_unknown_code_is_not_found() {
        let mut roster = MockRoster::new();
        roster.expect_contains().return_const(false);

        let result = manual_check(&roster, "qr999");

        assert_eq!(
            result,
            ManualCheck::NotFound { code: NormalizedCode::new("QR999") }
        );
        assert_eq!(result.message(), "Code not found.");
    }

    #[test]
    fn test_still_decode_without_library() {
        let result = decode_still(None, &payload_frame("QR100"));
        assert_eq!(result, StillDecode::LibraryMissing);
    }

    #[test]
    fn test_still_decode_reports_payload_or_no_code() {
        let decoder = MockFrameDecoder::new();

        let hit = decode_still(Some(&decoder), &payload_frame("QR100"));
        let miss = decode_still(Some(&decoder), &Frame::new(1, 1, vec![0; 4]));

        assert_eq!(hit.message(), "Decoded: QR100");
        assert_eq!(miss, StillDecode::NoCode);
    }

    #[test]
    fn test_still_decode_rejects_malformed_frame() {
        let decoder = MockFrameDecoder::new();
        let result = decode_still(Some(&decoder), &Frame::new(4, 4, vec![1; 3]));
        assert_eq!(result, StillDecode::InvalidImage);
        assert_eq!(decoder.calls(), 0);
    }
}
