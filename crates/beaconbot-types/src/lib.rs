use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Range reported for a sector with no obstacle inside the sensor's reach.
///
/// Every sector distance is clamped to this ceiling, so "infinite" or
/// out-of-range samples read as clear space.
pub const SENTINEL_RANGE: f32 = 10.0;

/// Guard added to the zeroth moment before dividing, so an empty mask
/// yields a centroid of `0.0` instead of a division fault.
pub const MOMENT_EPSILON: f64 = 1e-5;

// ────────────────────────────────────────────────────────────────────────────
// Range sectors
// ────────────────────────────────────────────────────────────────────────────

/// Minimum obstacle distance (metres) inside each of the three forward
/// sectors of a range scan.
///
/// `left` and `right` follow the scan's index order, not the robot's sides:
/// `right` is the window starting just after index 0, `left` is the window
/// ending just before the upper half of the front window.  On a
/// counter-clockwise scan (the simulator's, and most lidars') `right` lies
/// on the robot's left and `left` on its right.  Avoidance turns positive
/// (counter-clockwise) when `right` is the more open of the two, which on
/// such a scan is a turn towards the open side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectorReading {
    pub front: f32,
    pub left: f32,
    pub right: f32,
}

impl Default for SectorReading {
    /// "No scan yet" reads as clear space in every direction.
    fn default() -> Self {
        Self {
            front: SENTINEL_RANGE,
            left: SENTINEL_RANGE,
            right: SENTINEL_RANGE,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Colour
// ────────────────────────────────────────────────────────────────────────────

/// An 8-bit hue/saturation/value triple.
///
/// Hue spans `0..180` (half-degrees), saturation and value span `0..=255`.
/// Serialises as a three-element array, e.g. `[115, 224, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

impl From<[u8; 3]> for Hsv {
    fn from([h, s, v]: [u8; 3]) -> Self {
        Self { h, s, v }
    }
}

impl From<Hsv> for [u8; 3] {
    fn from(px: Hsv) -> Self {
        [px.h, px.s, px.v]
    }
}

/// A closed HSV cuboid: a pixel matches when every channel lies within
/// `lower..=upper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorBounds {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl ColorBounds {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self {
            lower: Hsv::new(lower[0], lower[1], lower[2]),
            upper: Hsv::new(upper[0], upper[1], upper[2]),
        }
    }

    /// `true` when `px` lies inside the cuboid (bounds inclusive).
    pub fn contains(&self, px: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&px.h)
            && (self.lower.s..=self.upper.s).contains(&px.s)
            && (self.lower.v..=self.upper.v).contains(&px.v)
    }
}

/// One catalog entry: a beacon colour name and its bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedBounds {
    pub name: String,
    #[serde(flatten)]
    pub bounds: ColorBounds,
}

/// Ordered catalog of recognised beacon colours.
///
/// Target selection walks the entries in order and stops at the first
/// colour present in the frame, so overlapping ranges (Yellow sits inside
/// Green's hue range) resolve to whichever entry comes first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorCatalog {
    entries: Vec<NamedBounds>,
}

impl ColorCatalog {
    pub fn new(entries: Vec<NamedBounds>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedBounds> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by name (case-sensitive).
    pub fn get(&self, name: &str) -> Option<&ColorBounds> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.bounds)
    }
}

impl Default for ColorCatalog {
    fn default() -> Self {
        let entry = |name: &str, lower, upper| NamedBounds {
            name: name.to_string(),
            bounds: ColorBounds::new(lower, upper),
        };
        Self::new(vec![
            entry("Red", [0, 185, 100], [10, 255, 255]),
            entry("Blue", [115, 224, 100], [130, 255, 255]),
            entry("Yellow", [28, 180, 100], [32, 255, 255]),
            entry("Green", [25, 150, 100], [70, 255, 255]),
            entry("Turquoise", [75, 50, 100], [90, 255, 255]),
            entry("Purple", [145, 185, 100], [150, 250, 255]),
        ])
    }
}

/// The beacon colour chosen for a run.  Fixed once selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub bounds: ColorBounds,
}

// ────────────────────────────────────────────────────────────────────────────
// Detection
// ────────────────────────────────────────────────────────────────────────────

/// Moments of a colour mask over the cropped region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Zeroth moment of the mask (each set pixel weighs 255).
    pub coverage: f64,
    /// `m10 / (m00 + ε)`, in pixels from the crop's left edge.
    pub centroid_col: f64,
    /// Width of the cropped region the moments were taken over.
    pub frame_width: u32,
}

impl DetectionResult {
    /// Result of masking an empty or absent frame.
    pub fn empty(frame_width: u32) -> Self {
        Self {
            coverage: 0.0,
            centroid_col: 0.0,
            frame_width,
        }
    }

    pub fn from_moments(m00: f64, m10: f64, frame_width: u32) -> Self {
        Self {
            coverage: m00,
            centroid_col: m10 / (m00 + MOMENT_EPSILON),
            frame_width,
        }
    }

    /// `true` when at least one pixel passed the mask.
    pub fn is_present(&self) -> bool {
        self.coverage > 0.0
    }

    /// The centroid, or `None` while coverage is at or below
    /// `min_coverage` and the centroid is not trustworthy.
    pub fn usable_centroid(&self, min_coverage: f64) -> Option<f64> {
        (self.coverage > min_coverage).then_some(self.centroid_col)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Beaconing phases
// ────────────────────────────────────────────────────────────────────────────

/// The five phases of a beaconing run.  Exactly one is active per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeaconingPhase {
    Search,
    Track,
    Align,
    Approach,
    Done,
}

impl fmt::Display for BeaconingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BeaconingPhase::Search => "search",
            BeaconingPhase::Track => "track",
            BeaconingPhase::Align => "align",
            BeaconingPhase::Approach => "approach",
            BeaconingPhase::Done => "done",
        };
        f.write_str(name)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Motion
// ────────────────────────────────────────────────────────────────────────────

/// A single command sent to the motion actuator.
///
/// Rotations are signed degrees, positive = counter-clockwise (left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload")]
pub enum MotionCommand {
    /// Stage a velocity command; takes effect on the next `Publish`.
    SetVelocity { linear: f32, angular: f32 },
    /// Blocking, bounded in-place turn.
    RotateBy { degrees: f32 },
    /// Halt all motion immediately.
    Stop,
    /// Flush the most recently staged velocity.
    Publish,
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// Event wrapper routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"beaconbot-runtime::control_loop"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    TargetSelected { name: String },
    PhaseChanged { from: BeaconingPhase, to: BeaconingPhase },
    AvoidanceTurn { degrees: f32, reading: SectorReading },
    Motion(MotionCommand),
    SensorStale { component: String },
    SensorRecovered { component: String },
    TaskComplete,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every beaconbot crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BeaconError {
    #[error("No catalog colour visible in the current frame ({candidates} candidates checked)")]
    TargetNotFound { candidates: usize },

    #[error("Actuator fault on {component}: {details}")]
    ActuatorFault { component: String, details: String },

    #[error("Motion command rejected by {rule}: {details}")]
    CommandRejected { rule: String, details: String },

    #[error("Invalid image frame: {0}")]
    InvalidFrame(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event bus error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sector_reading_is_clear() {
        let r = SectorReading::default();
        assert_eq!(r.front, SENTINEL_RANGE);
        assert_eq!(r.left, SENTINEL_RANGE);
        assert_eq!(r.right, SENTINEL_RANGE);
    }

    #[test]
    fn bounds_are_inclusive_on_every_channel() {
        let b = ColorBounds::new([115, 224, 100], [130, 255, 255]);
        assert!(b.contains(Hsv::new(115, 224, 100)));
        assert!(b.contains(Hsv::new(130, 255, 255)));
        assert!(b.contains(Hsv::new(120, 240, 180)));
        assert!(!b.contains(Hsv::new(114, 240, 180)));
        assert!(!b.contains(Hsv::new(120, 223, 180)));
        assert!(!b.contains(Hsv::new(120, 240, 99)));
    }

    #[test]
    fn default_catalog_keeps_selection_order() {
        let catalog = ColorCatalog::default();
        let names: Vec<&str> = catalog.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            ["Red", "Blue", "Yellow", "Green", "Turquoise", "Purple"]
        );
        assert_eq!(
            catalog.get("Blue"),
            Some(&ColorBounds::new([115, 224, 100], [130, 255, 255]))
        );
        assert!(catalog.get("blue").is_none());
    }

    #[test]
    fn catalog_reads_from_toml_array_of_tables() {
        #[derive(Deserialize)]
        struct Wrapper {
            catalog: ColorCatalog,
        }
        let raw = r#"
            [[catalog]]
            name = "Orange"
            lower = [10, 150, 100]
            upper = [20, 255, 255]

            [[catalog]]
            name = "Blue"
            lower = [115, 224, 100]
            upper = [130, 255, 255]
        "#;
        let parsed: Wrapper = toml::from_str(raw).unwrap();
        assert_eq!(parsed.catalog.len(), 2);
        let first = parsed.catalog.iter().next().unwrap();
        assert_eq!(first.name, "Orange");
        assert_eq!(first.bounds.lower, Hsv::new(10, 150, 100));
    }

    #[test]
    fn empty_detection_has_guarded_centroid() {
        let d = DetectionResult::from_moments(0.0, 0.0, 640);
        assert_eq!(d.centroid_col, 0.0);
        assert!(!d.is_present());
        assert!(d.usable_centroid(10_000.0).is_none());
    }

    #[test]
    fn centroid_usable_only_above_min_coverage() {
        // 200 pixels at column 400, each weighing 255.
        let m00 = 200.0 * 255.0;
        let m10 = m00 * 400.0;
        let d = DetectionResult::from_moments(m00, m10, 800);
        assert!((d.centroid_col - 400.0).abs() < 1e-3);
        assert!(d.usable_centroid(m00).is_none());
        assert!(d.usable_centroid(10_000.0).is_some());
    }

    #[test]
    fn motion_command_roundtrip() {
        let cmd = MotionCommand::RotateBy { degrees: -25.0 };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: MotionCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, back);
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "beaconbot-runtime::control_loop",
            EventPayload::PhaseChanged {
                from: BeaconingPhase::Align,
                to: BeaconingPhase::Approach,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert!(matches!(
            back.payload,
            EventPayload::PhaseChanged {
                to: BeaconingPhase::Approach,
                ..
            }
        ));
    }

    #[test]
    fn beacon_error_display() {
        let err = BeaconError::TargetNotFound { candidates: 6 };
        assert!(err.to_string().contains("6 candidates"));

        let err = BeaconError::ActuatorFault {
            component: "drive_base".to_string(),
            details: "motor driver offline".to_string(),
        };
        assert!(err.to_string().contains("drive_base"));
    }
}
