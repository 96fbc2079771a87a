//! `beaconbot-runtime` – the beaconing controller and the loop that runs it.
//!
//! # Modules
//!
//! - [`beaconing`] – [`BeaconingStateMachine`]: the Search → Track → Align →
//!   Approach → Done controller, one [`step`][BeaconingStateMachine::step]
//!   per control tick.
//! - [`acquisition`] – [`acquire_target`]: turns to the start-zone marker
//!   and picks the beacon colour for the run.
//! - [`control_loop`] – [`ControlLoop`]: acquisition, fixed-rate ticking,
//!   sensor-health supervision and event publication, with a guaranteed
//!   final stop.
//! - [`sim_feed`] – [`spawn_sim_feed`]: a tokio producer feeding simulated
//!   range scans and camera frames into the perception snapshots.
//! - [`telemetry`] – [`init_tracing`]: installs the `tracing` subscriber,
//!   with OTLP span export when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//!
//! # Motion gating
//!
//! The controller never talks to a drive base directly: the control loop
//! hands it a [`MotionGate`], so every command is verified against the
//! motion limits before it is executed.

pub mod acquisition;
pub mod beaconing;
pub mod control_loop;
pub mod sim_feed;
pub mod telemetry;

pub use acquisition::{AcquisitionConfig, acquire_target};
pub use beaconing::{BeaconingConfig, BeaconingStateMachine, TickReport, steering_correction};
pub use control_loop::{ControlConfig, ControlLoop, ControlLoopConfig, RunOutcome};
pub use sim_feed::{SimFeedConfig, spawn_sim_feed};
pub use telemetry::{TracerProviderGuard, init_tracing};

pub use beaconbot_kernel::MotionGate;
