//! [`BeaconingStateMachine`] – the Search → Track → Align → Approach → Done
//! controller.
//!
//! One [`step`][BeaconingStateMachine::step] is one control tick.  Every
//! tick runs in two ordered phases:
//!
//! 1. **Safety** – [`ObstacleAvoidance`] gets the first word in the phases
//!    that drive forward (Search and Approach).  If it acts, the tick ends
//!    there and goal-seeking motion resumes on the next tick.
//! 2. **Goal** – the phase's own command: drive, sweep, rotate to find the
//!    beacon, or steer onto it.
//!
//! Each phase carries only the data that exists while it is active (the
//! grace countdown in Search, the sweep position in Track, the latched
//! heading in Approach), so invalid combinations cannot be represented.
//!
//! After any in-place turn the machine waits for a camera frame captured
//! after the turn before it trusts a detection again.

use beaconbot_hal::{MotionActuator, Odometry};
use beaconbot_kernel::{AvoidanceAction, ObstacleAvoidance};
use beaconbot_perception::{ColorTargetDetector, ViewMode};
use beaconbot_types::{BeaconError, BeaconingPhase, DetectionResult, SectorReading, Target};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables of the beaconing controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconingConfig {
    /// Forward speed in Search and Approach (m/s).
    pub speed: f32,
    /// Mask coverage above which the centroid is trusted for steering.
    pub min_coverage_threshold: f64,
    /// Turn per Align tick while the beacon is too small (degrees).
    pub align_step_degrees: f32,
    /// `|rot|` below which the heading counts as locked on the beacon.
    pub straight_ahead_epsilon: f32,
    /// Front distance that ends the run (metres).
    pub stop_distance_threshold: f32,
    /// Degrees turned per unit of steering correction.
    pub steer_gain_degrees: f32,
    /// Search ticks driven before the detector is polled.
    pub search_grace_ticks: u32,
    /// Half-width of the Track look-around sweep (degrees).
    pub sweep_degrees: f32,
    /// Front distance below which Approach switches to the high view band.
    pub high_view_distance: f32,
}

impl Default for BeaconingConfig {
    fn default() -> Self {
        Self {
            speed: 0.2,
            min_coverage_threshold: 10_000.0,
            align_step_degrees: 5.0,
            straight_ahead_epsilon: 0.1,
            stop_distance_threshold: 0.3,
            steer_gain_degrees: 20.0,
            search_grace_ticks: 40,
            sweep_degrees: 30.0,
            high_view_distance: 0.6,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage
// ─────────────────────────────────────────────────────────────────────────────

/// Position within the Track look-around sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    /// At the heading Track was entered with.
    Centre,
    /// Turned `+sweep_degrees`.
    Left,
    /// Turned `-sweep_degrees` from the entry heading.
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Search { grace_remaining: u32 },
    Track { sweep: Sweep },
    Align,
    Approach { locked_yaw: Option<f32> },
    Done { stopped: bool },
}

impl Stage {
    fn phase(&self) -> BeaconingPhase {
        match self {
            Stage::Search { .. } => BeaconingPhase::Search,
            Stage::Track { .. } => BeaconingPhase::Track,
            Stage::Align => BeaconingPhase::Align,
            Stage::Approach { .. } => BeaconingPhase::Approach,
            Stage::Done { .. } => BeaconingPhase::Done,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tick report
// ─────────────────────────────────────────────────────────────────────────────

/// What happened during one [`BeaconingStateMachine::step`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickReport {
    /// Phase change made this tick, if any.
    pub transition: Option<(BeaconingPhase, BeaconingPhase)>,
    /// Avoidance turn (signed degrees) and the reading it acted on.
    pub avoidance: Option<(f32, SectorReading)>,
    /// Detection measured this tick, if the phase polled the camera.
    pub detection: Option<DetectionResult>,
}

/// Steering correction for a detection: `-(centroid / width - 0.5)`, or
/// `0.5` when the centroid (or the frame width) is degenerate.
pub fn steering_correction(detection: &DetectionResult) -> f32 {
    if detection.centroid_col == 0.0 || detection.frame_width == 0 {
        return 0.5;
    }
    -((detection.centroid_col / detection.frame_width as f64) - 0.5) as f32
}

// ─────────────────────────────────────────────────────────────────────────────
// BeaconingStateMachine
// ─────────────────────────────────────────────────────────────────────────────

/// The beaconing controller.  Owns the run's [`Target`] and phase.
pub struct BeaconingStateMachine<A: MotionActuator, O: Odometry> {
    config: BeaconingConfig,
    target: Target,
    stage: Stage,
    avoidance: ObstacleAvoidance,
    detector: ColorTargetDetector,
    actuator: A,
    odometry: O,
    /// Frame version current when the last in-place turn was issued.
    turned_at_frame: Option<u64>,
}

impl<A: MotionActuator, O: Odometry> BeaconingStateMachine<A, O> {
    /// A machine in Search with a full grace countdown.
    pub fn new(
        config: BeaconingConfig,
        target: Target,
        avoidance: ObstacleAvoidance,
        detector: ColorTargetDetector,
        actuator: A,
        odometry: O,
    ) -> Self {
        Self {
            stage: Stage::Search {
                grace_remaining: config.search_grace_ticks,
            },
            config,
            target,
            avoidance,
            detector,
            actuator,
            odometry,
            turned_at_frame: None,
        }
    }

    pub fn phase(&self) -> BeaconingPhase {
        self.stage.phase()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Done { .. })
    }

    /// The heading latched when Approach locked onto the beacon.
    pub fn locked_heading(&self) -> Option<f32> {
        match self.stage {
            Stage::Approach { locked_yaw } => locked_yaw,
            _ => None,
        }
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Advance the controller by one tick.
    ///
    /// # Errors
    ///
    /// Propagates actuator errors.  The phase is left where the failing
    /// command would have taken it, so the next tick re-issues whatever
    /// that phase needs.
    pub fn step(&mut self) -> Result<TickReport, BeaconError> {
        let mut report = TickReport::default();
        // Every decision this tick sees the same sector snapshot.
        let reading = self.avoidance.reading();
        match self.stage {
            Stage::Search { grace_remaining } => {
                self.search(grace_remaining, &reading, &mut report)?
            }
            Stage::Track { sweep } => self.track(sweep, &mut report)?,
            Stage::Align => self.align(&mut report)?,
            Stage::Approach { locked_yaw } => self.approach(locked_yaw, &reading, &mut report)?,
            Stage::Done { stopped } => {
                if !stopped {
                    self.actuator.stop()?;
                    self.stage = Stage::Done { stopped: true };
                }
            }
        }
        Ok(report)
    }

    // ── Phases ───────────────────────────────────────────────────────────────

    fn search(
        &mut self,
        grace_remaining: u32,
        reading: &SectorReading,
        report: &mut TickReport,
    ) -> Result<(), BeaconError> {
        if self.avoid(reading, None, report)? {
            return Ok(());
        }
        self.actuator.set_velocity(self.config.speed, 0.0)?;
        self.actuator.publish()?;

        if grace_remaining > 0 {
            self.stage = Stage::Search {
                grace_remaining: grace_remaining - 1,
            };
            return Ok(());
        }
        if self.detect_target(report) {
            self.enter(Stage::Track { sweep: Sweep::Centre }, report)?;
        }
        Ok(())
    }

    fn track(&mut self, sweep: Sweep, report: &mut TickReport) -> Result<(), BeaconError> {
        if !self.frame_settled() {
            return Ok(());
        }
        if self.detect_target(report) {
            return self.enter(Stage::Align, report);
        }
        let step = self.config.sweep_degrees;
        match sweep {
            Sweep::Centre => {
                self.turn(step)?;
                self.stage = Stage::Track { sweep: Sweep::Left };
            }
            Sweep::Left => {
                self.turn(-2.0 * step)?;
                self.stage = Stage::Track { sweep: Sweep::Right };
            }
            Sweep::Right => {
                self.turn(step)?;
                info!(colour = %self.target.name, "beacon not found in sweep; resuming search");
                self.enter(
                    Stage::Search {
                        grace_remaining: self.config.search_grace_ticks,
                    },
                    report,
                )?;
            }
        }
        Ok(())
    }

    fn align(&mut self, report: &mut TickReport) -> Result<(), BeaconError> {
        if !self.frame_settled() {
            return Ok(());
        }
        let detection = self.detect(report);
        if detection.coverage > self.config.min_coverage_threshold {
            return self.enter(Stage::Approach { locked_yaw: None }, report);
        }
        debug!(coverage = detection.coverage, "beacon too small; rotating");
        self.turn(self.config.align_step_degrees)
    }

    fn approach(
        &mut self,
        mut locked_yaw: Option<f32>,
        reading: &SectorReading,
        report: &mut TickReport,
    ) -> Result<(), BeaconError> {
        if reading.front < self.config.stop_distance_threshold {
            info!(front = reading.front, "beacon reached");
            return self.enter(Stage::Done { stopped: false }, report);
        }
        if reading.front < self.config.high_view_distance {
            self.detector.set_view_mode(ViewMode::High);
        }

        let settled = self.frame_settled();
        let detection = self.detect(report);
        if !detection.is_present() {
            info!("beacon lost; re-aligning");
            return self.enter(Stage::Align, report);
        }

        // Steering is only trusted on a frame captured after the last turn
        // and once the beacon is large enough.
        let mut correction = None;
        if settled && detection.coverage > self.config.min_coverage_threshold {
            let rot = steering_correction(&detection);
            if rot.abs() < self.config.straight_ahead_epsilon {
                if locked_yaw.is_none() {
                    self.odometry.cache_current_heading();
                    let yaw = self.odometry.yaw();
                    info!(yaw, "heading locked on beacon");
                    locked_yaw = Some(yaw);
                }
            } else {
                correction = Some(rot * self.config.steer_gain_degrees);
            }
        }
        self.stage = Stage::Approach { locked_yaw };

        if locked_yaw.is_some() {
            if let Some(drift) = self.odometry.heading_drift() {
                debug!(drift_rad = drift, "heading drift since lock");
            }
        }

        let threshold = locked_yaw.map(|_| self.config.stop_distance_threshold);
        if self.avoid(reading, threshold, report)? {
            return Ok(());
        }
        if let Some(degrees) = correction {
            debug!(degrees, centroid = detection.centroid_col, "steering onto beacon");
            self.turn(degrees)?;
        }
        self.actuator.set_velocity(self.config.speed, 0.0)?;
        self.actuator.publish()
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Enter `next`, running its entry action.
    fn enter(&mut self, next: Stage, report: &mut TickReport) -> Result<(), BeaconError> {
        let from = self.stage.phase();
        let to = next.phase();
        self.stage = next;
        if from != to {
            info!(%from, %to, "beaconing phase changed");
            report.transition = Some((from, to));
        }
        if to != BeaconingPhase::Approach {
            self.detector.set_view_mode(ViewMode::Low);
        }
        match to {
            BeaconingPhase::Track | BeaconingPhase::Align => self.actuator.stop(),
            BeaconingPhase::Done => {
                self.actuator.stop()?;
                self.stage = Stage::Done { stopped: true };
                Ok(())
            }
            BeaconingPhase::Search | BeaconingPhase::Approach => Ok(()),
        }
    }

    /// Run avoidance on this tick's `reading`; `true` when it acted and
    /// the tick must end.
    fn avoid(
        &mut self,
        reading: &SectorReading,
        threshold: Option<f32>,
        report: &mut TickReport,
    ) -> Result<bool, BeaconError> {
        let threshold = threshold.unwrap_or(self.avoidance.config().front_distance_threshold);
        let version = self.detector.frame_version();
        match self.avoidance.attempt_on(reading, threshold, &mut self.actuator)? {
            AvoidanceAction::Turned { degrees } => {
                self.turned_at_frame = Some(version);
                report.avoidance = Some((degrees, *reading));
                Ok(true)
            }
            AvoidanceAction::None => Ok(false),
        }
    }

    fn turn(&mut self, degrees: f32) -> Result<(), BeaconError> {
        self.turned_at_frame = Some(self.detector.frame_version());
        self.actuator.rotate_by(degrees)
    }

    /// `true` once a frame newer than the last turn has arrived.
    fn frame_settled(&mut self) -> bool {
        match self.turned_at_frame {
            Some(version) if self.detector.frame_version() <= version => false,
            Some(_) => {
                self.turned_at_frame = None;
                true
            }
            None => true,
        }
    }

    fn detect(&self, report: &mut TickReport) -> DetectionResult {
        let detection = self.detector.detect(&self.target.bounds);
        report.detection = Some(detection);
        detection
    }

    fn detect_target(&self, report: &mut TickReport) -> bool {
        let detection = self.detect(report);
        ColorTargetDetector::matches(&detection, &self.target.bounds, &self.target)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
