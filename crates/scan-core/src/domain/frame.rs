//! Pixel buffers handed to a stateless QR decoder.

/// One RGBA frame sampled from a camera stream or loaded from an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 pixels, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self { width, height, rgba }
    }

    /// Returns `true` if the buffer length matches the declared dimensions.
    pub fn is_well_formed(&self) -> bool {
        let expected = self.width as usize * self.height as usize * 4;
        expected > 0 && self.rgba.len() == expected
    }
}
