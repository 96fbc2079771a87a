//! [`ObstacleAvoidance`] – one-shot reactive correction.
//!
//! Called once per control tick, before any goal-seeking command.  When
//! the front sector is closer than the threshold the robot is stopped and
//! turned by a fixed angle towards the sector with more clearance; otherwise
//! nothing is sent.  It never loops: one call, at most one stop and one turn.

use beaconbot_hal::MotionActuator;
use beaconbot_middleware::SnapshotReader;
use beaconbot_types::{BeaconError, SectorReading};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Avoidance tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    /// Front distance (metres) below which the correction fires.
    pub front_distance_threshold: f32,
    /// Magnitude of the corrective turn (degrees).
    pub turn_degrees: f32,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            front_distance_threshold: 0.4,
            turn_degrees: 25.0,
        }
    }
}

/// What one avoidance attempt did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AvoidanceAction {
    /// Front was clear; nothing was sent.
    None,
    /// The base was stopped and turned by `degrees` (signed, + = left).
    Turned { degrees: f32 },
}

impl AvoidanceAction {
    pub fn acted(&self) -> bool {
        matches!(self, AvoidanceAction::Turned { .. })
    }
}

/// Reactive avoidance over the latest sector reading.
pub struct ObstacleAvoidance {
    config: AvoidanceConfig,
    sectors: SnapshotReader<SectorReading>,
}

impl ObstacleAvoidance {
    pub fn new(config: AvoidanceConfig, sectors: SnapshotReader<SectorReading>) -> Self {
        Self { config, sectors }
    }

    pub fn config(&self) -> &AvoidanceConfig {
        &self.config
    }

    /// The sector reading the next attempt would act on.
    pub fn reading(&self) -> SectorReading {
        self.sectors.current()
    }

    /// Decide the correction for `reading` without touching the actuator.
    ///
    /// Turns `+turn_degrees` iff `right > left` strictly, otherwise
    /// `-turn_degrees`.  `left`/`right` are index-order windows: on a
    /// counter-clockwise scan `right` lies on the robot's left, so the
    /// positive (counter-clockwise) turn heads towards the more open side.
    pub fn decide(&self, reading: &SectorReading, front_threshold: f32) -> AvoidanceAction {
        if reading.front >= front_threshold {
            return AvoidanceAction::None;
        }
        let degrees = if reading.right > reading.left {
            self.config.turn_degrees
        } else {
            -self.config.turn_degrees
        };
        AvoidanceAction::Turned { degrees }
    }

    /// Run one avoidance check against the configured front threshold.
    ///
    /// # Errors
    ///
    /// Propagates the actuator's [`BeaconError`]; a failed stop skips the
    /// turn.
    pub fn attempt_avoidance<A>(&self, actuator: &mut A) -> Result<AvoidanceAction, BeaconError>
    where
        A: MotionActuator + ?Sized,
    {
        self.attempt_with_threshold(self.config.front_distance_threshold, actuator)
    }

    /// Like [`attempt_avoidance`][Self::attempt_avoidance] with an explicit
    /// front threshold.
    pub fn attempt_with_threshold<A>(
        &self,
        front_threshold: f32,
        actuator: &mut A,
    ) -> Result<AvoidanceAction, BeaconError>
    where
        A: MotionActuator + ?Sized,
    {
        self.attempt_on(&self.sectors.current(), front_threshold, actuator)
    }

    /// Act on a reading the caller already holds, so that one control tick
    /// decides everything from the same snapshot.
    pub fn attempt_on<A>(
        &self,
        reading: &SectorReading,
        front_threshold: f32,
        actuator: &mut A,
    ) -> Result<AvoidanceAction, BeaconError>
    where
        A: MotionActuator + ?Sized,
    {
        let action = self.decide(reading, front_threshold);
        if let AvoidanceAction::Turned { degrees } = action {
            info!(
                front = reading.front,
                left = reading.left,
                right = reading.right,
                degrees,
                "obstacle ahead; turning away"
            );
            actuator.stop()?;
            actuator.rotate_by(degrees)?;
        }
        Ok(action)
    }
}
