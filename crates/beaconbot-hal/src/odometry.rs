//! `Odometry` trait for heading/position providers.

/// Dead-reckoning pose source (wheel encoders, IMU fusion, simulator).
pub trait Odometry: Send {
    /// Current heading in radians, counter-clockwise from the start heading.
    fn yaw(&self) -> f32;

    /// Current position `(x, y)` in metres.
    fn position(&self) -> (f32, f32);

    /// Latch the current heading as the reference for later drift checks.
    fn cache_current_heading(&mut self);

    /// The heading latched by the last
    /// [`cache_current_heading`][Self::cache_current_heading] call, if any.
    fn cached_heading(&self) -> Option<f32>;

    /// Signed difference (radians) between the current heading and the
    /// latched one, wrapped to `(-π, π]`.
    fn heading_drift(&self) -> Option<f32> {
        self.cached_heading()
            .map(|cached| wrap_angle(self.yaw() - cached))
    }
}

/// Wrap an angle in radians to `(-π, π]`.
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}
