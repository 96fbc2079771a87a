//! Target acquisition: pick the run's beacon colour before the state
//! machine starts.
//!
//! The start-zone marker sits beside the robot, painted the colour of the
//! beacon to find.  Acquisition turns to face it, lets the camera deliver a
//! fresh frame, selects the first catalog colour visible, and turns back.

use std::time::Duration;

use beaconbot_hal::MotionActuator;
use beaconbot_perception::ColorTargetDetector;
use beaconbot_types::{BeaconError, ColorCatalog, Target};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Turn towards the start-zone marker (degrees, + = left).
    pub selection_turn_degrees: f32,
    /// Wait after the turn before sampling the camera (milliseconds).
    pub settle_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            selection_turn_degrees: 90.0,
            settle_ms: 1_000,
        }
    }
}

impl AcquisitionConfig {
    pub fn settle_duration(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Turn, sample, select, turn back.
///
/// The robot is turned back even when selection fails.
///
/// # Errors
///
/// - [`BeaconError::TargetNotFound`] – no catalog colour was visible.
/// - [`BeaconError::ActuatorFault`] / [`BeaconError::CommandRejected`] –
///   a turn failed.
pub async fn acquire_target<A>(
    actuator: &mut A,
    detector: &ColorTargetDetector,
    catalog: &ColorCatalog,
    config: &AcquisitionConfig,
) -> Result<Target, BeaconError>
where
    A: MotionActuator + ?Sized,
{
    let turn = config.selection_turn_degrees;
    actuator.rotate_by(turn)?;
    let version_after_turn = detector.frame_version();

    tokio::time::sleep(config.settle_duration()).await;
    if detector.frame_version() <= version_after_turn {
        warn!(
            settle_ms = config.settle_ms,
            "no camera frame since turning to the start marker; sampling the last one"
        );
    }

    let selection = detector.select_target(catalog);
    actuator.rotate_by(-turn)?;

    let target = selection?;
    info!(colour = %target.name, "target acquired");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaconbot_hal::sim::{SimConfig, SimWorld};
    use beaconbot_perception::RoiConfig;
    use beaconbot_types::MotionCommand;

    fn quick() -> AcquisitionConfig {
        AcquisitionConfig {
            settle_ms: 10,
            ..AcquisitionConfig::default()
        }
    }

    #[tokio::test]
    async fn selects_marker_colour_and_turns_back() {
        let world = SimWorld::new(SimConfig::default());
        let mut base = world.drive_base();
        let detector = ColorTargetDetector::new(RoiConfig::default());

        // The producer would normally refresh the frame during the settle
        // wait; emulate it by rendering once the turn has been made.
        let producer = {
            let world = world.clone();
            let detector = detector.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                detector.ingest(&world.frame()).unwrap();
            })
        };

        let target = acquire_target(&mut base, &detector, &ColorCatalog::default(), &quick())
            .await
            .unwrap();
        producer.await.unwrap();

        assert_eq!(target.name, "Blue");
        assert_eq!(
            world.commands(),
            [
                MotionCommand::RotateBy { degrees: 90.0 },
                MotionCommand::RotateBy { degrees: -90.0 },
            ]
        );
        assert!(world.pose().yaw.abs() < 1e-5);
    }

    #[tokio::test]
    async fn missing_colour_fails_after_turning_back() {
        let world = SimWorld::new(SimConfig {
            pillars: Vec::new(),
            ..SimConfig::default()
        });
        let mut base = world.drive_base();
        let detector = ColorTargetDetector::default();
        detector.ingest(&world.frame()).unwrap();

        let err = acquire_target(&mut base, &detector, &ColorCatalog::default(), &quick())
            .await
            .unwrap_err();

        assert_eq!(err, BeaconError::TargetNotFound { candidates: 6 });
        assert_eq!(world.commands().len(), 2);
    }
}
