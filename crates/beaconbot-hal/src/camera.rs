//! Camera frames as delivered by the image transport.

use beaconbot_types::BeaconError;

/// A BGR8 image: row-major, three bytes per pixel, blue first.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl ImageFrame {
    /// Wrap raw BGR8 bytes, checking that the buffer matches the dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidFrame`] when `data.len()` is not
    /// `width * height * 3`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, BeaconError> {
        let frame = Self {
            width,
            height,
            data,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// A frame with every pixel set to `bgr`.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            data: bgr.repeat(pixels),
        }
    }

    /// Check that the buffer length matches the dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidFrame`] on a mismatch.
    pub fn validate(&self) -> Result<(), BeaconError> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(BeaconError::InvalidFrame(format!(
                "{}x{} BGR8 frame needs {expected} bytes, got {}",
                self.width,
                self.height,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// BGR triple at column `x`, row `y`.  Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Overwrite the pixel at column `x`, row `y`.  Panics when out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, bgr: [u8; 3]) {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.data[i..i + 3].copy_from_slice(&bgr);
    }

    /// Paint the rectangle `[x0, x1) × [y0, y1)` (clipped to the frame).
    pub fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, bgr: [u8; 3]) {
        for y in y0..y1.min(self.height) {
            for x in x0..x1.min(self.width) {
                self.set_pixel(x, y, bgr);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_short_buffer() {
        let err = ImageFrame::new(2, 2, vec![0; 11]).unwrap_err();
        assert!(matches!(err, BeaconError::InvalidFrame(_)));
        assert!(ImageFrame::new(2, 2, vec![0; 12]).is_ok());
    }

    #[test]
    fn filled_frame_has_uniform_pixels() {
        let frame = ImageFrame::filled(3, 2, [10, 20, 30]);
        assert_eq!(frame.data.len(), 18);
        assert_eq!(frame.pixel(2, 1), [10, 20, 30]);
    }

    #[test]
    fn fill_rect_clips_to_frame() {
        let mut frame = ImageFrame::filled(4, 4, [0, 0, 0]);
        frame.fill_rect(2, 2, 10, 10, [255, 0, 0]);
        assert_eq!(frame.pixel(3, 3), [255, 0, 0]);
        assert_eq!(frame.pixel(1, 1), [0, 0, 0]);
        assert_eq!(frame.pixel(2, 1), [0, 0, 0]);
    }
}
