//! `beaconbot-perception` – turns raw sensor frames into the scalars the
//! controller steers by.
//!
//! # Modules
//!
//! - [`sectors`] – [`LidarSectorMonitor`][sectors::LidarSectorMonitor]:
//!   reduces each range scan to front / left / right minimum distances over
//!   configured angular windows, the front window wrapping the 0°/360° seam.
//! - [`color`] – BGR→HSV conversion, region-of-interest cropping and mask
//!   moments (coverage and centroid column).
//! - [`detector`] – [`ColorTargetDetector`][detector::ColorTargetDetector]:
//!   holds the latest cropped HSV frame, measures a colour's coverage and
//!   centroid in it, and picks the run's target colour from a catalog.

pub mod color;
pub mod detector;
pub mod sectors;

pub use color::{HsvImage, Roi, RoiConfig, ViewMode, bgr_to_hsv};
pub use detector::ColorTargetDetector;
pub use sectors::{LidarSectorMonitor, SectorConfig, SectorWindows};
