//! Sensor producer for the in-process simulator.
//!
//! Stands in for the sensor transport: a tokio task that advances the
//! simulated world, feeds each range scan to the [`LidarSectorMonitor`]
//! and every n-th camera frame to the [`ColorTargetDetector`], at rates
//! independent of the control loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use beaconbot_hal::sim::SimWorld;
use beaconbot_perception::{ColorTargetDetector, LidarSectorMonitor};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimFeedConfig {
    /// Physics and range-scan rate (Hz).
    pub physics_hz: f64,
    /// Render a camera frame every this many physics steps.
    pub camera_every: u32,
}

impl Default for SimFeedConfig {
    fn default() -> Self {
        Self {
            physics_hz: 50.0,
            camera_every: 2,
        }
    }
}

/// Spawn the producer task.  It runs until `shutdown` is set.
pub fn spawn_sim_feed(
    world: SimWorld,
    mut sectors: LidarSectorMonitor,
    detector: ColorTargetDetector,
    config: SimFeedConfig,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let period = Duration::from_secs_f64(1.0 / config.physics_hz.max(1.0));
    let dt = period.as_secs_f32();
    let camera_every = config.camera_every.max(1);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut step: u64 = 0;

        while !shutdown.load(Ordering::SeqCst) {
            interval.tick().await;
            world.step(dt);
            sectors.update(&world.scan());
            if step % camera_every as u64 == 0 {
                if let Err(err) = detector.ingest(&world.frame()) {
                    warn!(error = %err, "dropping simulated camera frame");
                }
            }
            step += 1;
        }
        debug!(steps = step, "simulated sensor feed stopped");
    })
}
