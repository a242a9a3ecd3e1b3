//! QR frame decoder backed by `rqrr`.
//!
//! Frames are reduced to 8-bit luma and searched for QR grids.  Badges
//! printed light-on-dark are common, so when the image as captured yields
//! nothing the inverted image is tried before giving up.

use std::path::Path;

use scan_core::Frame;
use tracing::trace;

use super::raw::FrameDecoder;

/// Stateless [`FrameDecoder`] over the `rqrr` grid detector.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrFrameDecoder;

impl QrFrameDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameDecoder for QrFrameDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        if !frame.is_well_formed() {
            return None;
        }
        let luma = to_luma(frame);
        decode_luma(frame.width as usize, frame.height as usize, &luma, false)
            .or_else(|| decode_luma(frame.width as usize, frame.height as usize, &luma, true))
    }
}

/// ITU-R BT.601 weights; alpha is ignored.
fn to_luma(frame: &Frame) -> Vec<u8> {
    frame
        .rgba
        .chunks_exact(4)
        .map(|px| {
            let y = 299 * u32::from(px[0]) + 587 * u32::from(px[1]) + 114 * u32::from(px[2]);
            (y / 1000) as u8
        })
        .collect()
}

fn decode_luma(width: usize, height: usize, luma: &[u8], invert: bool) -> Option<String> {
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
        let value = luma[y * width + x];
        if invert {
            255 - value
        } else {
            value
        }
    });
    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_, content)) => return Some(content),
            Err(e) => trace!("QR grid found but not decodable (inverted={invert}): {e}"),
        }
    }
    None
}

/// Loads an image file into an RGBA [`Frame`] for still-image decoding.
pub fn load_still(path: &Path) -> Result<Frame, image::ImageError> {
    let rgba = image::open(path)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Frame::new(width, height, rgba.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrcode::{Color, QrCode};
    use uuid::Uuid;

    const SCALE: usize = 4;
    const QUIET: usize = 4;

    /// Renders `payload` as a QR code, dark modules on light, or the reverse.
    fn qr_frame(payload: &str, inverted: bool) -> Frame {
        let code = QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width();
        let colors = code.to_colors();
        let side = (modules + 2 * QUIET) * SCALE;
        let mut rgba = Vec::with_capacity(side * side * 4);
        for y in 0..side {
            for x in 0..side {
                let (mx, my) = (x / SCALE, y / SCALE);
                let dark = (QUIET..QUIET + modules).contains(&mx)
                    && (QUIET..QUIET + modules).contains(&my)
                    && colors[(my - QUIET) * modules + (mx - QUIET)] == Color::Dark;
                let value = if dark != inverted { 0 } else { 255 };
                rgba.extend_from_slice(&[value, value, value, 255]);
            }
        }
        Frame::new(side as u32, side as u32, rgba)
    }

    #[test]
    fn test_decodes_dark_on_light_code() {
        let decoded = QrFrameDecoder::new().decode(&qr_frame("8JKH3B4O", false));
        assert_eq!(decoded.as_deref(), Some("8JKH3B4O"));
    }

    #[test]
    fn test_decodes_inverted_code() {
        let decoded = QrFrameDecoder::new().decode(&qr_frame("8JKH3B4O", true));
        assert_eq!(decoded.as_deref(), Some("8JKH3B4O"));
    }

    #[test]
    fn test_blank_and_malformed_frames_yield_nothing() {
        let decoder = QrFrameDecoder::new();
        assert_eq!(decoder.decode(&Frame::new(32, 32, vec![255; 32 * 32 * 4])), None);
        assert_eq!(decoder.decode(&Frame::new(32, 32, vec![255; 10])), None);
    }

    #[test]
    fn test_luma_weights_channels() {
        let frame = Frame::new(2, 1, vec![255, 255, 255, 0, 255, 0, 0, 255]);
        assert_eq!(to_luma(&frame), vec![255, 76]);
    }

    #[test]
    fn test_load_still_reads_png_from_disk() {
        // Arrange
        let source = qr_frame("QR100", false);
        let path = std::env::temp_dir().join(format!("merit_scan_still_{}.png", Uuid::new_v4()));
        image::save_buffer(
            &path,
            &source.rgba,
            source.width,
            source.height,
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();

        // Act
        let loaded = load_still(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        // Assert
        assert_eq!(loaded, source);
        assert_eq!(QrFrameDecoder::new().decode(&loaded).as_deref(), Some("QR100"));
    }

    #[test]
    fn test_load_still_missing_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("merit_scan_missing_{}.png", Uuid::new_v4()));
        assert!(load_still(&path).is_err());
    }
}
