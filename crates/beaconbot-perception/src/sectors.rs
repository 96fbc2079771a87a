//! Range-scan sector extraction.
//!
//! A scan is a circular array of `C` range samples, index 0 straight ahead.
//! Three windows are cut from it, named by index order:
//!
//! ```text
//!            left            front             right
//!   … [C-h₁-l, C-h₁) [C-h₁, C) ∪ [0, h₀) [h₀, h₀+r) …
//! ```
//!
//! where the front window of `f` indices is split into `h₀ = f / 2`
//! indices after the seam and `h₁ = f - h₀` before it.  Each sector reports
//! the minimum finite sample inside its window, capped at a ceiling, so
//! "no return" and out-of-range samples read as clear space.
//!
//! The names do not follow the robot's sides.  On a counter-clockwise scan
//! the `right` window (indices just after 0) looks to the robot's left and
//! the `left` window looks to its right.
//!
//! # Example
//!
//! ```rust
//! use beaconbot_perception::sectors::{LidarSectorMonitor, SectorConfig};
//!
//! let mut monitor = LidarSectorMonitor::new(SectorConfig::default(), 360);
//! let mut ranges = vec![f32::INFINITY; 360];
//! ranges[350] = 0.8; // 10 samples before the seam: part of the front window
//! ranges[40] = 1.2;  // inside the right window (the robot's left on a CCW scan)
//!
//! let reading = monitor.update(&ranges);
//! assert_eq!(reading.front, 0.8);
//! assert_eq!(reading.right, 1.2);
//! assert_eq!(reading.left, 10.0);
//! ```

use std::ops::Range;

use beaconbot_middleware::{SnapshotCell, SnapshotReader};
use beaconbot_types::{SectorReading, SENTINEL_RANGE};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Angular widths of the three sectors and the distance ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorConfig {
    /// Width of the front window (degrees), centred on index 0.
    pub front_width_deg: f32,
    /// Width of the window adjoining the front window below the seam.
    /// On a counter-clockwise scan this window is on the robot's right.
    pub left_width_deg: f32,
    /// Width of the window adjoining the front window above index 0.
    /// On a counter-clockwise scan this window is on the robot's left.
    pub right_width_deg: f32,
    /// Sector values are capped here (metres).
    pub ceiling: f32,
}

impl Default for SectorConfig {
    fn default() -> Self {
        Self {
            front_width_deg: 36.0,
            left_width_deg: 36.0,
            right_width_deg: 36.0,
            ceiling: SENTINEL_RANGE,
        }
    }
}

/// Index windows for one scan size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorWindows {
    pub count: usize,
    /// `[C - h₁, C)` and `[0, h₀)`.
    pub front: [Range<usize>; 2],
    pub left: Range<usize>,
    pub right: Range<usize>,
}

impl SectorWindows {
    /// Convert angular widths to index windows over a `count`-sample scan.
    pub fn new(config: &SectorConfig, count: usize) -> Self {
        let to_indices = |deg: f32| {
            let idx = (deg.max(0.0) / 360.0 * count as f32).round();
            (idx as usize).min(count)
        };
        Self::from_indices(
            count,
            to_indices(config.front_width_deg),
            to_indices(config.left_width_deg),
            to_indices(config.right_width_deg),
        )
    }

    /// Build windows from widths already expressed in samples.
    ///
    /// Widths are clamped so the three windows never overlap: the front
    /// window takes priority, then right, then left.
    pub fn from_indices(count: usize, front: usize, left: usize, right: usize) -> Self {
        let front = front.min(count);
        let after_seam = front / 2;
        let before_seam = front - after_seam;
        let side_room = count - front;
        let right = right.min(side_room);
        let left = left.min(side_room - right);

        let upper_start = count - before_seam;
        Self {
            count,
            front: [upper_start..count, 0..after_seam],
            left: upper_start - left..upper_start,
            right: after_seam..after_seam + right,
        }
    }

    /// Total number of indices in the front window.
    pub fn front_len(&self) -> usize {
        self.front.iter().map(|r| r.len()).sum()
    }

    /// Reduce `ranges` to a [`SectorReading`], capping every value at
    /// `ceiling`.  A window reaching past the end of a short scan is
    /// read as clear.
    pub fn reduce(&self, ranges: &[f32], ceiling: f32) -> SectorReading {
        SectorReading {
            front: window_min(ranges, self.front.iter().cloned(), ceiling),
            left: window_min(ranges, [self.left.clone()], ceiling),
            right: window_min(ranges, [self.right.clone()], ceiling),
        }
    }
}

/// Minimum finite, non-negative sample across `windows`, capped at
/// `ceiling`.  An empty or all-invalid window yields `ceiling`.
fn window_min(
    ranges: &[f32],
    windows: impl IntoIterator<Item = Range<usize>>,
    ceiling: f32,
) -> f32 {
    windows
        .into_iter()
        .flat_map(|w| ranges.get(w).unwrap_or_default().iter().copied())
        .filter(|r| r.is_finite() && *r >= 0.0)
        .fold(ceiling, f32::min)
}

/// Producer-side sector extractor.
///
/// The sensor callback owns the monitor and calls
/// [`update`][Self::update] on every scan; consumers hold a
/// [`SnapshotReader`] from [`reader`][Self::reader] and see each reading
/// replaced wholesale.
pub struct LidarSectorMonitor {
    config: SectorConfig,
    windows: SectorWindows,
    cell: SnapshotCell<SectorReading>,
}

impl LidarSectorMonitor {
    /// Create a monitor for scans of `sample_count` samples.  Until the
    /// first scan arrives the published reading is all-clear.
    pub fn new(config: SectorConfig, sample_count: usize) -> Self {
        Self {
            windows: SectorWindows::new(&config, sample_count),
            config,
            cell: SnapshotCell::new(SectorReading::default()),
        }
    }

    /// Recompute and publish the reading for a new scan.
    ///
    /// A scan whose length differs from the configured sample count
    /// rebuilds the index windows for the new size.
    pub fn update(&mut self, ranges: &[f32]) -> SectorReading {
        if ranges.len() != self.windows.count {
            info!(
                previous = self.windows.count,
                samples = ranges.len(),
                "scan size changed; rebuilding sector windows"
            );
            self.windows = SectorWindows::new(&self.config, ranges.len());
        }
        let reading = self.windows.reduce(ranges, self.config.ceiling);
        self.cell.publish(reading);
        reading
    }

    /// The latest published reading.
    pub fn current(&self) -> SectorReading {
        self.cell.latest().value
    }

    /// A read-only handle for consumers.
    pub fn reader(&self) -> SnapshotReader<SectorReading> {
        self.cell.reader()
    }

    pub fn windows(&self) -> &SectorWindows {
        &self.windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_windows_over_360_samples() {
        let w = SectorWindows::new(&SectorConfig::default(), 360);
        assert_eq!(w.front, [342..360, 0..18]);
        assert_eq!(w.right, 18..54);
        assert_eq!(w.left, 306..342);
        assert_eq!(w.front_len(), 36);
    }

    #[test]
    fn odd_front_width_still_covers_every_index() {
        let w = SectorWindows::from_indices(100, 7, 5, 5);
        assert_eq!(w.front, [96..100, 0..3]);
        assert_eq!(w.front_len(), 7);
        assert_eq!(w.right, 3..8);
        assert_eq!(w.left, 91..96);
    }

    #[test]
    fn degrees_scale_to_sample_count() {
        let config = SectorConfig::default();
        let w = SectorWindows::new(&config, 720);
        assert_eq!(w.front_len(), 72);
        assert_eq!(w.right.len(), 72);
    }

    #[test]
    fn sides_are_clamped_to_remaining_samples() {
        let w = SectorWindows::from_indices(10, 6, 10, 10);
        assert_eq!(w.front_len(), 6);
        assert_eq!(w.right.len(), 4);
        assert_eq!(w.left.len(), 0);
    }

    #[test]
    fn front_reads_both_sides_of_the_seam() {
        let mut monitor = LidarSectorMonitor::new(SectorConfig::default(), 360);
        let mut ranges = vec![2.0; 360];
        ranges[359] = 0.45;
        assert_eq!(monitor.update(&ranges).front, 0.45);

        ranges[359] = 2.0;
        ranges[0] = 0.3;
        assert_eq!(monitor.update(&ranges).front, 0.3);
    }

    #[test]
    fn non_finite_and_far_samples_read_as_ceiling() {
        let mut monitor = LidarSectorMonitor::new(SectorConfig::default(), 360);
        let mut ranges = vec![f32::INFINITY; 360];
        ranges[20] = f32::NAN;
        ranges[320] = 25.0;
        let reading = monitor.update(&ranges);
        assert_eq!(reading, SectorReading::default());
    }

    #[test]
    fn empty_window_reads_as_ceiling() {
        let config = SectorConfig {
            left_width_deg: 0.0,
            ..SectorConfig::default()
        };
        let mut monitor = LidarSectorMonitor::new(config, 360);
        let reading = monitor.update(&vec![0.5; 360]);
        assert_eq!(reading.left, SENTINEL_RANGE);
        assert_eq!(reading.right, 0.5);
    }

    #[test]
    fn current_is_clear_before_first_scan_and_latest_after() {
        let mut monitor = LidarSectorMonitor::new(SectorConfig::default(), 360);
        let reader = monitor.reader();
        assert_eq!(monitor.current(), SectorReading::default());
        assert_eq!(reader.version(), 0);

        monitor.update(&vec![1.0; 360]);
        assert_eq!(reader.current().front, 1.0);
        assert_eq!(reader.version(), 1);
    }

    #[test]
    fn resized_scan_rebuilds_windows() {
        let mut monitor = LidarSectorMonitor::new(SectorConfig::default(), 360);
        let mut ranges = vec![3.0; 720];
        ranges[700] = 0.6; // inside the 72-sample front window of a 720 scan
        let reading = monitor.update(&ranges);
        assert_eq!(monitor.windows().count, 720);
        assert_eq!(reading.front, 0.6);
    }

    proptest! {
        #[test]
        fn front_window_covers_exactly_front_width(
            count in 1usize..1024,
            front_frac in 0.0f64..=1.0,
        ) {
            let front = ((count as f64) * front_frac) as usize;
            let w = SectorWindows::from_indices(count, front, 10, 10);
            prop_assert_eq!(w.front_len(), front);
            // Upper part ends at the array boundary, lower part starts at 0.
            prop_assert_eq!(w.front[0].end, count);
            prop_assert_eq!(w.front[1].start, 0);
        }

        #[test]
        fn front_equals_min_of_wrapped_window(
            ranges in prop::collection::vec(
                prop_oneof![0.0f32..20.0, Just(f32::INFINITY), Just(f32::NAN)],
                8..400,
            ),
            front_frac in 0.0f64..=1.0,
        ) {
            let count = ranges.len();
            let front = ((count as f64) * front_frac) as usize;
            let w = SectorWindows::from_indices(count, front, 0, 0);
            let reading = w.reduce(&ranges, SENTINEL_RANGE);

            let half = front / 2;
            let expected = ranges
                .iter()
                .enumerate()
                .filter(|(i, _)| *i < half || *i >= count - (front - half))
                .map(|(_, r)| *r)
                .filter(|r| r.is_finite())
                .fold(SENTINEL_RANGE, f32::min);
            prop_assert_eq!(reading.front, expected);
        }

        #[test]
        fn windows_never_overlap(
            count in 1usize..720,
            front in 0usize..720,
            left in 0usize..720,
            right in 0usize..720,
        ) {
            let w = SectorWindows::from_indices(count, front, left, right);
            let mut seen = vec![false; count];
            let all = w.front.iter().cloned().chain([w.left.clone(), w.right.clone()]);
            for window in all {
                for i in window {
                    prop_assert!(!seen[i], "index {} in two windows", i);
                    seen[i] = true;
                }
            }
        }
    }
}
