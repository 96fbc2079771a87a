//! `MotionActuator` trait for the robot's drive base.
//!
//! Drivers implement this trait; the rest of the stack only ever talks to
//! the trait, so drivers can be swapped without touching the controller.

use beaconbot_types::{BeaconError, MotionCommand};

/// A differential-drive base that accepts velocity and turn commands.
///
/// Velocity commands are two-step: [`set_velocity`][Self::set_velocity]
/// stages a command and [`publish`][Self::publish] flushes it to the
/// motors.  [`rotate_by`][Self::rotate_by] is a blocking, bounded turn that
/// leaves the base stationary when it returns.
pub trait MotionActuator: Send {
    /// Stable identifier for this base, e.g. `"drive_base"`.
    fn id(&self) -> &str;

    /// Stage a linear (m/s) and angular (rad/s, positive = left) velocity.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::ActuatorFault`] if the driver rejects the
    /// command.
    fn set_velocity(&mut self, linear: f32, angular: f32) -> Result<(), BeaconError>;

    /// Turn in place by `degrees` (positive = counter-clockwise) and return
    /// once the turn is complete.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::ActuatorFault`] if the turn cannot be executed.
    fn rotate_by(&mut self, degrees: f32) -> Result<(), BeaconError>;

    /// Halt all motion immediately.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::ActuatorFault`] if the stop cannot be sent.
    fn stop(&mut self) -> Result<(), BeaconError>;

    /// Flush the most recently staged velocity to the motors.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::ActuatorFault`] if the command cannot be sent.
    fn publish(&mut self) -> Result<(), BeaconError>;

    /// Route a [`MotionCommand`] to the matching method.
    fn execute(&mut self, command: MotionCommand) -> Result<(), BeaconError> {
        match command {
            MotionCommand::SetVelocity { linear, angular } => self.set_velocity(linear, angular),
            MotionCommand::RotateBy { degrees } => self.rotate_by(degrees),
            MotionCommand::Stop => self.stop(),
            MotionCommand::Publish => self.publish(),
        }
    }
}

impl<A: MotionActuator + ?Sized> MotionActuator for &mut A {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn set_velocity(&mut self, linear: f32, angular: f32) -> Result<(), BeaconError> {
        (**self).set_velocity(linear, angular)
    }

    fn rotate_by(&mut self, degrees: f32) -> Result<(), BeaconError> {
        (**self).rotate_by(degrees)
    }

    fn stop(&mut self) -> Result<(), BeaconError> {
        (**self).stop()
    }

    fn publish(&mut self) -> Result<(), BeaconError> {
        (**self).publish()
    }
}

impl<A: MotionActuator + ?Sized> MotionActuator for Box<A> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn set_velocity(&mut self, linear: f32, angular: f32) -> Result<(), BeaconError> {
        (**self).set_velocity(linear, angular)
    }

    fn rotate_by(&mut self, degrees: f32) -> Result<(), BeaconError> {
        (**self).rotate_by(degrees)
    }

    fn stop(&mut self) -> Result<(), BeaconError> {
        (**self).stop()
    }

    fn publish(&mut self) -> Result<(), BeaconError> {
        (**self).publish()
    }
}
