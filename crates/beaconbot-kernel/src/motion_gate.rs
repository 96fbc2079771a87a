//! [`MotionGate`] – single interception point between the controller and
//! the drive base.
//!
//! Every command the controller sends passes through the gate, which:
//!
//! 1. validates it against the [`StateVerifier`] rules, rejecting it with
//!    [`BeaconError::CommandRejected`] without forwarding;
//! 2. publishes accepted commands on [`Topic::MotionCommands`] when a bus
//!    is attached;
//! 3. forwards it to the wrapped [`MotionActuator`].
//!
//! Dropping the gate sends a final `stop()` to the wrapped actuator.  Since
//! drop runs on normal return, on `?` early returns and while unwinding a
//! panic, the base is always left stationary once the gate goes away.
//!
//! # Example
//!
//! ```
//! use beaconbot_hal::{MotionActuator, sim::{SimConfig, SimWorld}};
//! use beaconbot_kernel::{MotionGate, MotionLimits, StateVerifier};
//! use beaconbot_types::MotionCommand;
//!
//! let world = SimWorld::new(SimConfig::default());
//! {
//!     let mut gate = MotionGate::new(
//!         world.drive_base(),
//!         StateVerifier::with_limits(&MotionLimits::default()),
//!     );
//!     gate.set_velocity(0.2, 0.0).unwrap();
//!     assert!(gate.set_velocity(5.0, 0.0).is_err());
//! }
//! assert_eq!(world.commands().last(), Some(&MotionCommand::Stop));
//! ```

use beaconbot_hal::MotionActuator;
use beaconbot_middleware::{EventBus, Topic};
use beaconbot_types::{BeaconError, Event, EventPayload, MotionCommand};
use tracing::{debug, warn};

use crate::state_verifier::StateVerifier;

const EVENT_SOURCE: &str = "beaconbot-kernel::motion_gate";

/// Verifying, publishing actuator wrapper with stop-on-drop.
pub struct MotionGate<A: MotionActuator> {
    actuator: A,
    verifier: StateVerifier,
    bus: Option<EventBus>,
}

impl<A: MotionActuator> MotionGate<A> {
    pub fn new(actuator: A, verifier: StateVerifier) -> Self {
        Self {
            actuator,
            verifier,
            bus: None,
        }
    }

    /// Publish every accepted command on `bus`.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The wrapped actuator.
    pub fn inner(&self) -> &A {
        &self.actuator
    }

    fn forward(&mut self, command: MotionCommand) -> Result<(), BeaconError> {
        if let Err(err) = self.verifier.verify(&command) {
            warn!(actuator = self.actuator.id(), ?command, error = %err, "motion command rejected");
            return Err(err);
        }
        debug!(actuator = self.actuator.id(), ?command, "motion command");
        if let Some(bus) = &self.bus {
            bus.publish_to(
                Topic::MotionCommands,
                Event::new(EVENT_SOURCE, EventPayload::Motion(command)),
            );
        }
        self.actuator.execute(command)
    }
}

impl<A: MotionActuator> MotionActuator for MotionGate<A> {
    fn id(&self) -> &str {
        self.actuator.id()
    }

    fn set_velocity(&mut self, linear: f32, angular: f32) -> Result<(), BeaconError> {
        self.forward(MotionCommand::SetVelocity { linear, angular })
    }

    fn rotate_by(&mut self, degrees: f32) -> Result<(), BeaconError> {
        self.forward(MotionCommand::RotateBy { degrees })
    }

    fn stop(&mut self) -> Result<(), BeaconError> {
        self.forward(MotionCommand::Stop)
    }

    fn publish(&mut self) -> Result<(), BeaconError> {
        self.forward(MotionCommand::Publish)
    }
}

impl<A: MotionActuator> Drop for MotionGate<A> {
    fn drop(&mut self) {
        match self.actuator.stop() {
            Ok(()) => debug!(actuator = self.actuator.id(), "final stop issued"),
            Err(err) => warn!(actuator = self.actuator.id(), error = %err, "final stop failed"),
        }
    }
}
