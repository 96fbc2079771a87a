//! `beaconbot-hal` – hardware seams.
//!
//! The controller only ever talks to the traits in this crate, so the same
//! state machine drives a TurtleBot-class base, a bench rig, or the
//! in-process simulator.
//!
//! # Modules
//!
//! - [`actuator`] – [`MotionActuator`]: velocity, bounded-turn and stop
//!   commands for a differential-drive base.
//! - [`odometry`] – [`Odometry`]: current heading and a latched reference
//!   heading for drift comparison.
//! - [`camera`] – [`ImageFrame`]: BGR8 image frames as delivered by the
//!   camera transport.
//! - [`sim`] – [`SimWorld`][sim::SimWorld]: a 2-D arena simulator that
//!   renders range scans and camera frames and implements both traits, for
//!   headless runs and tests.

pub mod actuator;
pub mod camera;
pub mod odometry;
pub mod sim;

pub use actuator::MotionActuator;
pub use camera::ImageFrame;
pub use odometry::Odometry;
