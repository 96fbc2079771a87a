//! [`StateVerifier`] – motion safety interlock / rule engine.
//!
//! Before a [`MotionCommand`] reaches the drive base, pass it through
//! [`StateVerifier::verify`].  Every registered [`Rule`] is evaluated in
//! order; the first violation returns a [`BeaconError::CommandRejected`]
//! and the command is **not** executed.
//!
//! Two built-in rules are provided:
//! - [`SpeedCapRule`] – rejects `SetVelocity` commands whose linear or
//!   angular velocities exceed configured caps.
//! - [`RotationCapRule`] – rejects `RotateBy` commands larger than one
//!   bounded turn.
//!
//! `Stop` and `Publish` pass every built-in rule.

use beaconbot_types::{BeaconError, MotionCommand};
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single physical invariant that a command must satisfy.
///
/// Implement this trait to create custom safety rules and add them to a
/// [`StateVerifier`] via [`StateVerifier::add_rule`].
pub trait Rule: Send + Sync {
    /// Human-readable name used in rejection messages.
    fn name(&self) -> &str;

    /// Return `Ok(())` when the command satisfies the invariant, or a
    /// human-readable reason when it is violated.
    fn check(&self, command: &MotionCommand) -> Result<(), String>;
}

// ────────────────────────────────────────────────────────────────────────────
// StateVerifier
// ────────────────────────────────────────────────────────────────────────────

/// Caps applied by [`StateVerifier::with_limits`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionLimits {
    /// Maximum absolute linear velocity (m/s).
    pub max_linear: f32,
    /// Maximum absolute angular velocity (rad/s).
    pub max_angular: f32,
    /// Maximum absolute single turn (degrees).
    pub max_rotation_degrees: f32,
}

impl Default for MotionLimits {
    /// Drive limits of a small differential-drive research base.
    fn default() -> Self {
        Self {
            max_linear: 0.26,
            max_angular: 1.82,
            max_rotation_degrees: 180.0,
        }
    }
}

/// Rule engine that validates a [`MotionCommand`] against all registered
/// [`Rule`]s before it is dispatched.
///
/// # Example
///
/// ```
/// use beaconbot_kernel::state_verifier::{StateVerifier, SpeedCapRule};
/// use beaconbot_types::MotionCommand;
///
/// let mut verifier = StateVerifier::new();
/// verifier.add_rule(Box::new(SpeedCapRule { max_linear: 1.0, max_angular: 1.0 }));
///
/// let safe = MotionCommand::SetVelocity { linear: 0.5, angular: 0.2 };
/// assert!(verifier.verify(&safe).is_ok());
///
/// let too_fast = MotionCommand::SetVelocity { linear: 2.0, angular: 0.0 };
/// assert!(verifier.verify(&too_fast).is_err());
/// ```
#[derive(Default)]
pub struct StateVerifier {
    rules: Vec<Box<dyn Rule>>,
}

impl StateVerifier {
    /// Create an empty verifier with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// A verifier holding a [`SpeedCapRule`] and a [`RotationCapRule`]
    /// built from `limits`.
    pub fn with_limits(limits: &MotionLimits) -> Self {
        let mut verifier = Self::new();
        verifier.add_rule(Box::new(SpeedCapRule {
            max_linear: limits.max_linear,
            max_angular: limits.max_angular,
        }));
        verifier.add_rule(Box::new(RotationCapRule {
            max_degrees: limits.max_rotation_degrees,
        }));
        verifier
    }

    /// Register a new [`Rule`].  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Validate `command` against every registered rule.
    ///
    /// Returns the first [`BeaconError::CommandRejected`] encountered, or
    /// `Ok(())` when all rules pass.
    pub fn verify(&self, command: &MotionCommand) -> Result<(), BeaconError> {
        for rule in &self.rules {
            rule.check(command)
                .map_err(|details| BeaconError::CommandRejected {
                    rule: rule.name().to_string(),
                    details,
                })?;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Rejects [`MotionCommand::SetVelocity`] commands whose `linear` or
/// `angular` magnitudes exceed configured caps.  Non-finite velocities are
/// always rejected.
pub struct SpeedCapRule {
    /// Maximum allowed absolute linear velocity (m/s).
    pub max_linear: f32,
    /// Maximum allowed absolute angular velocity (rad/s).
    pub max_angular: f32,
}

impl Rule for SpeedCapRule {
    fn name(&self) -> &str {
        "speed_cap"
    }

    fn check(&self, command: &MotionCommand) -> Result<(), String> {
        if let MotionCommand::SetVelocity { linear, angular } = command {
            if linear.is_nan() || linear.abs() > self.max_linear {
                return Err(format!("linear {linear} exceeds cap {}", self.max_linear));
            }
            if angular.is_nan() || angular.abs() > self.max_angular {
                return Err(format!(
                    "angular {angular} exceeds cap {}",
                    self.max_angular
                ));
            }
        }
        Ok(())
    }
}

/// Rejects [`MotionCommand::RotateBy`] turns larger than `max_degrees`.
pub struct RotationCapRule {
    pub max_degrees: f32,
}

impl Rule for RotationCapRule {
    fn name(&self) -> &str {
        "rotation_cap"
    }

    fn check(&self, command: &MotionCommand) -> Result<(), String> {
        match command {
            MotionCommand::RotateBy { degrees }
                if degrees.is_nan() || degrees.abs() > self.max_degrees =>
            {
                Err(format!(
                    "rotation {degrees}° exceeds cap {}°",
                    self.max_degrees
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------ helpers
    fn speed_verifier(max_linear: f32, max_angular: f32) -> StateVerifier {
        let mut v = StateVerifier::new();
        v.add_rule(Box::new(SpeedCapRule {
            max_linear,
            max_angular,
        }));
        v
    }

    fn drive(linear: f32, angular: f32) -> MotionCommand {
        MotionCommand::SetVelocity { linear, angular }
    }

    // ------------------------------------------------------------------ SpeedCapRule

    #[test]
    fn drive_within_caps_passes() {
        let v = speed_verifier(1.0, 1.0);
        assert!(v.verify(&drive(0.5, 0.5)).is_ok());
    }

    #[test]
    fn drive_at_cap_boundary_passes() {
        let v = speed_verifier(1.0, 1.0);
        assert!(v.verify(&drive(1.0, -1.0)).is_ok());
    }

    #[test]
    fn drive_linear_over_cap_rejected() {
        let v = speed_verifier(1.0, 1.0);
        assert!(matches!(
            v.verify(&drive(1.1, 0.0)),
            Err(BeaconError::CommandRejected { ref rule, .. }) if rule == "speed_cap"
        ));
    }

    #[test]
    fn drive_negative_angular_over_cap_rejected() {
        let v = speed_verifier(1.0, 1.0);
        assert!(v.verify(&drive(0.0, -1.5)).is_err());
    }

    #[test]
    fn nan_velocity_rejected() {
        let v = speed_verifier(1.0, 1.0);
        assert!(v.verify(&drive(f32::NAN, 0.0)).is_err());
    }

    // ------------------------------------------------------------------ RotationCapRule

    #[test]
    fn rotation_within_cap_passes() {
        let v = StateVerifier::with_limits(&MotionLimits::default());
        assert!(v.verify(&MotionCommand::RotateBy { degrees: -90.0 }).is_ok());
        assert!(v.verify(&MotionCommand::RotateBy { degrees: 180.0 }).is_ok());
    }

    #[test]
    fn oversized_rotation_rejected() {
        let v = StateVerifier::with_limits(&MotionLimits::default());
        let err = v.verify(&MotionCommand::RotateBy { degrees: 270.0 }).unwrap_err();
        assert!(matches!(err, BeaconError::CommandRejected { ref rule, .. } if rule == "rotation_cap"));
    }

    // ------------------------------------------------------------------ Multiple rules

    #[test]
    fn default_limits_register_both_rules() {
        let v = StateVerifier::with_limits(&MotionLimits::default());
        assert_eq!(v.rule_count(), 2);
        assert!(v.verify(&drive(0.2, 0.0)).is_ok());
        assert!(v.verify(&drive(0.3, 0.0)).is_err());
    }

    #[test]
    fn stop_and_publish_pass_all_rules() {
        let v = StateVerifier::with_limits(&MotionLimits {
            max_linear: 0.0,
            max_angular: 0.0,
            max_rotation_degrees: 0.0,
        });
        assert!(v.verify(&MotionCommand::Stop).is_ok());
        assert!(v.verify(&MotionCommand::Publish).is_ok());
    }

    #[test]
    fn empty_verifier_always_passes() {
        let v = StateVerifier::new();
        assert!(v.verify(&drive(999.0, 999.0)).is_ok());
        assert!(v.verify(&MotionCommand::RotateBy { degrees: 720.0 }).is_ok());
    }
}
