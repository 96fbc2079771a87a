//! Beacon colour detection over the latest camera frame.
//!
//! The image callback calls [`ColorTargetDetector::ingest`] on every frame;
//! the crop is converted to HSV once and published as a whole-value
//! snapshot.  The control loop then measures any colour against that
//! snapshot with [`ColorTargetDetector::detect`], so a frame is never
//! observed half-converted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use beaconbot_hal::ImageFrame;
use beaconbot_middleware::SnapshotCell;
use beaconbot_types::{BeaconError, ColorBounds, ColorCatalog, DetectionResult, Target};
use tracing::{debug, info};

use crate::color::{HsvImage, RoiConfig, ViewMode};

/// Cropped-frame colour detector.
///
/// Cloning is cheap; clones share the frame snapshot and view mode, so the
/// image producer and the control loop can each hold one.
#[derive(Clone)]
pub struct ColorTargetDetector {
    roi: RoiConfig,
    view_high: Arc<AtomicBool>,
    latest: SnapshotCell<Option<Arc<HsvImage>>>,
}

impl ColorTargetDetector {
    pub fn new(roi: RoiConfig) -> Self {
        Self {
            roi,
            view_high: Arc::new(AtomicBool::new(false)),
            latest: SnapshotCell::new(None),
        }
    }

    pub fn roi(&self) -> RoiConfig {
        self.roi
    }

    pub fn view_mode(&self) -> ViewMode {
        if self.view_high.load(Ordering::Acquire) {
            ViewMode::High
        } else {
            ViewMode::Low
        }
    }

    /// Switch the crop band used for subsequent frames.
    pub fn set_view_mode(&self, mode: ViewMode) {
        let high = mode == ViewMode::High;
        if self.view_high.swap(high, Ordering::AcqRel) != high {
            debug!(?mode, "detector view mode changed");
        }
    }

    /// Crop and convert `frame` under the current view mode, then publish
    /// it as the latest snapshot.  Returns the snapshot version.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidFrame`] when the buffer does not match
    /// the frame dimensions; the previous snapshot is kept.
    pub fn ingest(&self, frame: &ImageFrame) -> Result<u64, BeaconError> {
        let image = self.crop(frame)?;
        Ok(self.latest.publish(Some(Arc::new(image))))
    }

    /// Version of the latest frame snapshot; `0` until the first frame.
    pub fn frame_version(&self) -> u64 {
        self.latest.latest().version
    }

    /// Crop `frame`, convert it and measure the mask `bounds` selects.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidFrame`] for a malformed frame.
    pub fn apply_mask(
        &self,
        frame: &ImageFrame,
        bounds: &ColorBounds,
    ) -> Result<DetectionResult, BeaconError> {
        Ok(self.crop(frame)?.mask_moments(bounds))
    }

    /// Measure `bounds` against the latest frame snapshot.  With no frame
    /// yet the result is empty (zero coverage).
    pub fn detect(&self, bounds: &ColorBounds) -> DetectionResult {
        match self.latest.latest().value {
            Some(image) => image.mask_moments(bounds),
            None => DetectionResult::empty(0),
        }
    }

    /// Pick the run's target: the first catalog entry with at least one
    /// pixel in the latest frame.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::TargetNotFound`] when no entry matches or no
    /// frame has arrived.
    pub fn select_target(&self, catalog: &ColorCatalog) -> Result<Target, BeaconError> {
        let not_found = || BeaconError::TargetNotFound {
            candidates: catalog.len(),
        };
        let image = self.latest.latest().value.ok_or_else(not_found)?;
        let entry = catalog
            .iter()
            .find(|entry| image.any_match(&entry.bounds))
            .ok_or_else(not_found)?;
        info!(colour = %entry.name, "beacon colour selected");
        Ok(Target {
            name: entry.name.clone(),
            bounds: entry.bounds,
        })
    }

    /// `true` when `result` is a non-empty mask taken with `result_bounds`
    /// and those bounds are the active target's.
    pub fn matches(result: &DetectionResult, result_bounds: &ColorBounds, target: &Target) -> bool {
        result.is_present() && *result_bounds == target.bounds
    }

    fn crop(&self, frame: &ImageFrame) -> Result<HsvImage, BeaconError> {
        frame.validate()?;
        let roi = self.roi.region(frame.width, frame.height, self.view_mode());
        Ok(HsvImage::from_region(frame, roi))
    }
}

impl Default for ColorTargetDetector {
    fn default() -> Self {
        Self::new(RoiConfig::default())
    }
}
