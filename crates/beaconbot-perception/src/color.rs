//! Colour conversion, region-of-interest cropping and mask moments.
//!
//! HSV follows the 8-bit convention used by common vision libraries: hue is
//! stored as half-degrees in `0..180`, saturation and value span `0..=255`.

use beaconbot_hal::ImageFrame;
use beaconbot_types::{ColorBounds, DetectionResult, Hsv};
use serde::{Deserialize, Serialize};

/// Weight of one set pixel in an 8-bit mask.
const MASK_WEIGHT: f64 = 255.0;

/// Convert one BGR pixel to 8-bit HSV.
pub fn bgr_to_hsv([b, g, r]: [u8; 3]) -> Hsv {
    let (b, g, r) = (b as i32, g as i32, r as i32);
    let v = b.max(g).max(r);
    let diff = v - b.min(g).min(r);

    let s = if v == 0 { 0 } else { (255 * diff + v / 2) / v };

    let h = if diff == 0 {
        0.0
    } else {
        let d = diff as f32;
        let deg = if v == r {
            60.0 * (g - b) as f32 / d
        } else if v == g {
            120.0 + 60.0 * (b - r) as f32 / d
        } else {
            240.0 + 60.0 * (r - g) as f32 / d
        };
        if deg < 0.0 { deg + 360.0 } else { deg }
    };
    let h = (h / 2.0).round() as i32 % 180;

    Hsv::new(h as u8, s as u8, v as u8)
}

// ────────────────────────────────────────────────────────────────────────────
// Region of interest
// ────────────────────────────────────────────────────────────────────────────

/// Which horizontal band of the frame the detector looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    /// Band centred on the frame's vertical centre.
    #[default]
    Low,
    /// Band lifted towards the top of the frame, for when the beacon is
    /// close and fills the upper part of the image.
    High,
}

/// Crop geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    /// Pixels removed from the frame width, split evenly between both sides.
    pub horizontal_margin: u32,
    pub band_height: u32,
    /// How far the high band sits above the low band (pixels).
    pub high_band_lift: u32,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            horizontal_margin: 800,
            band_height: 400,
            high_band_lift: 200,
        }
    }
}

/// A crop rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RoiConfig {
    /// The crop for a `width × height` frame in the given view mode.
    ///
    /// A margin that would leave no pixels keeps the whole width; the band
    /// is clamped to the frame height and the lifted band to the frame top.
    pub fn region(&self, width: u32, height: u32, mode: ViewMode) -> Roi {
        let crop_width = if self.horizontal_margin < width {
            width - self.horizontal_margin
        } else {
            width
        };
        let crop_height = self.band_height.min(height);
        let low_y = (height - crop_height) / 2;
        let y = match mode {
            ViewMode::Low => low_y,
            ViewMode::High => low_y.saturating_sub(self.high_band_lift),
        };
        Roi {
            x: (width - crop_width) / 2,
            y,
            width: crop_width,
            height: crop_height,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HSV image
// ────────────────────────────────────────────────────────────────────────────

/// A cropped frame converted to HSV, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct HsvImage {
    width: u32,
    height: u32,
    pixels: Vec<Hsv>,
}

impl HsvImage {
    /// Crop `frame` to `roi` (clipped to the frame) and convert to HSV.
    pub fn from_region(frame: &ImageFrame, roi: Roi) -> Self {
        let x1 = roi.x.saturating_add(roi.width).min(frame.width);
        let y1 = roi.y.saturating_add(roi.height).min(frame.height);
        let x0 = roi.x.min(x1);
        let y0 = roi.y.min(y1);

        let mut pixels = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
        for y in y0..y1 {
            for x in x0..x1 {
                pixels.push(bgr_to_hsv(frame.pixel(x, y)));
            }
        }
        Self {
            width: x1 - x0,
            height: y1 - y0,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Hsv {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Zeroth moment and column centroid of the mask `bounds` selects.
    pub fn mask_moments(&self, bounds: &ColorBounds) -> DetectionResult {
        if self.width == 0 {
            return DetectionResult::empty(0);
        }
        let mut count = 0_u64;
        let mut col_sum = 0_u64;
        for (i, px) in self.pixels.iter().enumerate() {
            if bounds.contains(*px) {
                count += 1;
                col_sum += (i % self.width as usize) as u64;
            }
        }
        DetectionResult::from_moments(
            count as f64 * MASK_WEIGHT,
            col_sum as f64 * MASK_WEIGHT,
            self.width,
        )
    }

    /// `true` when at least one pixel falls inside `bounds`.
    pub fn any_match(&self, bounds: &ColorBounds) -> bool {
        self.pixels.iter().any(|px| bounds.contains(*px))
    }
}
