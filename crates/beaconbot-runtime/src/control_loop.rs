//! [`ControlLoop`] – fixed-rate supervisor around the beaconing controller.
//!
//! A run is:
//!
//! 1. **Acquire** – [`acquire_target`] picks the beacon colour.
//! 2. **Tick** – the [`BeaconingStateMachine`] is stepped at
//!    [`ControlConfig::tick_hz`] until it reaches Done or `shutdown` is set.
//!    Sensor freshness is checked every tick and phase changes, avoidance
//!    turns and sensor outages are published on the [`EventBus`].
//! 3. **Stop** – the [`MotionGate`] owned by the machine is dropped, which
//!    sends the final stop to the drive base whatever the outcome.
//!
//! Errors inside a tick (a rejected or failed command) are logged and the
//! loop carries on; the next tick re-issues what the phase needs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use beaconbot_hal::{MotionActuator, Odometry};
use beaconbot_kernel::{AvoidanceConfig, MotionGate, ObstacleAvoidance, Watchdog};
use beaconbot_middleware::{EventBus, SnapshotReader, Topic};
use beaconbot_perception::ColorTargetDetector;
use beaconbot_types::{BeaconError, ColorCatalog, Event, EventPayload, SectorReading};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::acquisition::{AcquisitionConfig, acquire_target};
use crate::beaconing::{BeaconingConfig, BeaconingStateMachine, TickReport};

const EVENT_SOURCE: &str = "beaconbot-runtime::control_loop";

const LIDAR: &str = "lidar";
const CAMERA: &str = "camera";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Controller tick rate (Hz).
    pub tick_hz: f64,
    /// Silence after which a sensor stream is reported stale (milliseconds).
    pub sensor_timeout_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_hz: 20.0,
            sensor_timeout_ms: 1_000,
        }
    }
}

impl ControlConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(0.1))
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }
}

/// Everything a [`ControlLoop`] needs besides its I/O handles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLoopConfig {
    pub control: ControlConfig,
    pub acquisition: AcquisitionConfig,
    pub avoidance: AvoidanceConfig,
    pub beaconing: BeaconingConfig,
    pub catalog: ColorCatalog,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The beacon was reached.
    Completed,
    /// `shutdown` was set before the beacon was reached.
    Interrupted,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sensor health
// ─────────────────────────────────────────────────────────────────────────────

/// Turns snapshot version changes into watchdog heartbeats and outage
/// events.
struct SensorHealth {
    watchdog: Watchdog,
    sectors: SnapshotReader<SectorReading>,
    detector: ColorTargetDetector,
    lidar_seen: u64,
    camera_seen: u64,
}

impl SensorHealth {
    fn new(
        sectors: SnapshotReader<SectorReading>,
        detector: ColorTargetDetector,
        timeout: Duration,
    ) -> Self {
        let mut watchdog = Watchdog::new();
        watchdog.register(LIDAR, timeout);
        watchdog.register(CAMERA, timeout);
        Self {
            watchdog,
            lidar_seen: sectors.version(),
            camera_seen: detector.frame_version(),
            sectors,
            detector,
        }
    }

    /// Heartbeat every stream that published since the last poll and
    /// return the outage events to publish.
    fn poll(&mut self) -> Vec<EventPayload> {
        let mut events = Vec::new();

        let lidar = self.sectors.version();
        if lidar != self.lidar_seen {
            self.lidar_seen = lidar;
            if self.watchdog.heartbeat(LIDAR) {
                info!(component = LIDAR, "sensor stream recovered");
                events.push(EventPayload::SensorRecovered {
                    component: LIDAR.to_string(),
                });
            }
        }
        let camera = self.detector.frame_version();
        if camera != self.camera_seen {
            self.camera_seen = camera;
            if self.watchdog.heartbeat(CAMERA) {
                info!(component = CAMERA, "sensor stream recovered");
                events.push(EventPayload::SensorRecovered {
                    component: CAMERA.to_string(),
                });
            }
        }

        let mut stale = self.watchdog.newly_timed_out();
        stale.sort();
        for component in stale {
            warn!(component = %component, "sensor stream stale");
            events.push(EventPayload::SensorStale { component });
        }
        events
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

/// One beaconing run against a drive base, odometry and the two sensor
/// snapshots.
pub struct ControlLoop<A: MotionActuator, O: Odometry> {
    config: ControlLoopConfig,
    gate: MotionGate<A>,
    odometry: O,
    sectors: SnapshotReader<SectorReading>,
    detector: ColorTargetDetector,
    bus: EventBus,
}

impl<A: MotionActuator, O: Odometry> ControlLoop<A, O> {
    pub fn new(
        config: ControlLoopConfig,
        gate: MotionGate<A>,
        odometry: O,
        sectors: SnapshotReader<SectorReading>,
        detector: ColorTargetDetector,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            gate,
            odometry,
            sectors,
            detector,
            bus,
        }
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Acquire a target and drive to it.
    ///
    /// # Errors
    ///
    /// Only acquisition failures end the run with an error
    /// ([`BeaconError::TargetNotFound`] or a failed selection turn).  The
    /// drive base has been sent a stop by the time this returns, in every
    /// case.
    #[instrument(skip_all, name = "control_loop")]
    pub async fn run(self, shutdown: Arc<AtomicBool>) -> Result<RunOutcome, BeaconError> {
        let ControlLoop {
            config,
            mut gate,
            odometry,
            sectors,
            detector,
            bus,
        } = self;

        if shutdown.load(Ordering::SeqCst) {
            return Ok(RunOutcome::Interrupted);
        }

        let target = acquire_target(&mut gate, &detector, &config.catalog, &config.acquisition).await?;
        bus.publish_to(
            Topic::Telemetry,
            Event::new(
                EVENT_SOURCE,
                EventPayload::TargetSelected {
                    name: target.name.clone(),
                },
            ),
        );

        let mut health = SensorHealth::new(
            sectors.clone(),
            detector.clone(),
            config.control.sensor_timeout(),
        );
        let avoidance = ObstacleAvoidance::new(config.avoidance, sectors);
        let mut machine = BeaconingStateMachine::new(
            config.beaconing,
            target,
            avoidance,
            detector,
            gate,
            odometry,
        );

        let mut interval = tokio::time::interval(config.control.tick_period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        let outcome = loop {
            interval.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                info!(phase = %machine.phase(), ticks, "shutdown requested");
                break RunOutcome::Interrupted;
            }

            for payload in health.poll() {
                bus.publish_to(Topic::SystemAlerts, Event::new(EVENT_SOURCE, payload));
            }

            match machine.step() {
                Ok(report) => publish_report(&bus, &report),
                Err(err) => warn!(phase = %machine.phase(), error = %err, "tick failed"),
            }
            ticks += 1;

            if machine.is_done() {
                // Done's own stop may have failed; give it one more tick.
                if let Err(err) = machine.step() {
                    warn!(error = %err, "stop on completion failed");
                }
                bus.publish_to(
                    Topic::Telemetry,
                    Event::new(EVENT_SOURCE, EventPayload::TaskComplete),
                );
                info!(colour = %machine.target().name, ticks, "beacon reached");
                break RunOutcome::Completed;
            }
        };

        drop(machine);
        debug!(?outcome, "control loop finished");
        Ok(outcome)
    }
}

fn publish_report(bus: &EventBus, report: &TickReport) {
    if let Some((from, to)) = report.transition {
        bus.publish_to(
            Topic::Telemetry,
            Event::new(EVENT_SOURCE, EventPayload::PhaseChanged { from, to }),
        );
    }
    if let Some((degrees, reading)) = report.avoidance {
        bus.publish_to(
            Topic::SystemAlerts,
            Event::new(EVENT_SOURCE, EventPayload::AvoidanceTurn { degrees, reading }),
        );
    }
}
