//! `beaconbot-kernel` – Safety layer
//!
//! Everything between the controller's decisions and the drive base.  It
//! does not plan; it overrides, checks and supervises.
//!
//! # Modules
//!
//! - [`avoidance`] – [`ObstacleAvoidance`][avoidance::ObstacleAvoidance]:
//!   the one-shot reactive correction that stops and turns the robot away
//!   from an obstacle dead ahead.  Runs before any goal-seeking command.
//! - [`state_verifier`] – [`StateVerifier`][state_verifier::StateVerifier]:
//!   a rule engine that validates every
//!   [`MotionCommand`][beaconbot_types::MotionCommand] against speed and
//!   rotation caps.
//! - [`motion_gate`] – [`MotionGate`][motion_gate::MotionGate]:
//!   the single path from the controller to the actuator.  Verifies and
//!   publishes every command, and stops the base when dropped.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]:
//!   tracks heartbeats from the sensor streams and reports when one goes
//!   silent or comes back.

pub mod avoidance;
pub mod motion_gate;
pub mod state_verifier;
pub mod watchdog;

pub use avoidance::{AvoidanceAction, AvoidanceConfig, ObstacleAvoidance};
pub use motion_gate::MotionGate;
pub use state_verifier::{MotionLimits, RotationCapRule, Rule, SpeedCapRule, StateVerifier};
pub use watchdog::Watchdog;
