//! In-process arena simulator for headless runs and CI testing.
//!
//! [`SimWorld`] models a square, walled arena containing cylindrical
//! pillars, each painted a single colour.  It renders the two sensor
//! streams the controller consumes and implements the hardware traits:
//!
//! - [`SimWorld::scan`] – a 360° range scan, index 0 straight ahead and
//!   indices increasing counter-clockwise.  Returns beyond `max_range` are
//!   reported as `f32::INFINITY`, like a real scanner's "no return".
//! - [`SimWorld::frame`] – a BGR8 camera frame.  Pixel columns increase to
//!   the robot's right; every pillar inside the field of view paints the
//!   full height of the columns it subtends.
//! - [`SimDriveBase`] – a [`MotionActuator`] that records every command.
//!   Staged velocities take effect on `publish` and are integrated by
//!   [`SimWorld::step`]; `rotate_by` turns instantly and leaves the base
//!   stationary.
//! - [`SimOdometry`] – an [`Odometry`] reading the simulated pose.
//!
//! # Example
//!
//! ```rust
//! use beaconbot_hal::sim::{SimConfig, SimWorld};
//! use beaconbot_hal::MotionActuator;
//!
//! let world = SimWorld::new(SimConfig::default());
//! let mut base = world.drive_base();
//! base.set_velocity(0.2, 0.0).unwrap();
//! base.publish().unwrap();
//! world.step(1.0);
//! assert!((world.pose().x - 0.2).abs() < 1e-4);
//! ```

use std::f32::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use beaconbot_types::{BeaconError, MotionCommand};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actuator::MotionActuator;
use crate::camera::ImageFrame;
use crate::odometry::{wrap_angle, Odometry};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// A coloured cylinder standing in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimPillar {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    /// Paint colour, blue first.
    pub bgr: [u8; 3],
}

/// Arena layout, sensor geometry and start pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Walls stand at `±arena_half_width` on both axes (metres).
    pub arena_half_width: f32,
    pub pillars: Vec<SimPillar>,
    pub start_x: f32,
    pub start_y: f32,
    pub start_yaw_deg: f32,
    /// Footprint radius used for collision detection (metres).
    pub robot_radius: f32,
    pub scan_samples: usize,
    /// Scanner reach (metres).  Farther surfaces produce no return.
    pub max_range: f32,
    pub image_width: u32,
    pub image_height: u32,
    pub horizontal_fov_deg: f32,
    pub background_bgr: [u8; 3],
}

impl Default for SimConfig {
    /// A blue beacon 2 m ahead of the start pose, a blue start-zone marker
    /// to the robot's left, and a red distractor off to the right.
    fn default() -> Self {
        Self {
            arena_half_width: 3.0,
            pillars: vec![
                SimPillar {
                    x: 2.0,
                    y: 0.0,
                    radius: 0.15,
                    bgr: [255, 0, 0],
                },
                SimPillar {
                    x: 0.0,
                    y: 0.6,
                    radius: 0.1,
                    bgr: [255, 0, 0],
                },
                SimPillar {
                    x: 1.2,
                    y: -1.5,
                    radius: 0.15,
                    bgr: [0, 0, 255],
                },
            ],
            start_x: 0.0,
            start_y: 0.0,
            start_yaw_deg: 0.0,
            robot_radius: 0.1,
            scan_samples: 360,
            max_range: 3.5,
            image_width: 640,
            image_height: 480,
            horizontal_fov_deg: 62.0,
            background_bgr: [90, 90, 90],
        }
    }
}

/// Simulated robot pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimPose {
    pub x: f32,
    pub y: f32,
    /// Radians, counter-clockwise, wrapped to `(-π, π]`.
    pub yaw: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// World
// ────────────────────────────────────────────────────────────────────────────

struct WorldState {
    config: SimConfig,
    pose: SimPose,
    staged: (f32, f32),
    active: (f32, f32),
    pending_faults: u32,
    collisions: u32,
    commands: Vec<MotionCommand>,
}

/// Shared handle to a simulated arena.  Clones refer to the same world.
#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<WorldState>>,
}

impl SimWorld {
    pub fn new(config: SimConfig) -> Self {
        let pose = SimPose {
            x: config.start_x,
            y: config.start_y,
            yaw: wrap_angle(config.start_yaw_deg.to_radians()),
        };
        Self {
            state: Arc::new(Mutex::new(WorldState {
                config,
                pose,
                staged: (0.0, 0.0),
                active: (0.0, 0.0),
                pending_faults: 0,
                collisions: 0,
                commands: Vec::new(),
            })),
        }
    }

    /// A drive base acting on this world.
    pub fn drive_base(&self) -> SimDriveBase {
        SimDriveBase {
            world: self.clone(),
        }
    }

    /// An odometry provider reading this world's pose.
    pub fn odometry(&self) -> SimOdometry {
        SimOdometry {
            world: self.clone(),
            cached: None,
        }
    }

    pub fn pose(&self) -> SimPose {
        self.lock().pose
    }

    /// Teleport the robot (tests only need this to set up scenes).
    pub fn set_pose(&self, x: f32, y: f32, yaw_deg: f32) {
        self.lock().pose = SimPose {
            x,
            y,
            yaw: wrap_angle(yaw_deg.to_radians()),
        };
    }

    /// Velocity currently being executed by the motors `(linear, angular)`.
    pub fn active_velocity(&self) -> (f32, f32) {
        self.lock().active
    }

    /// Number of steps in which the robot would have hit a wall or pillar.
    pub fn collisions(&self) -> u32 {
        self.lock().collisions
    }

    /// Every command the drive base accepted, oldest first.
    pub fn commands(&self) -> Vec<MotionCommand> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// Make the next `count` drive-base commands fail with an actuator fault.
    pub fn inject_actuator_faults(&self, count: u32) {
        self.lock().pending_faults = count;
    }

    /// Integrate the active velocity over `dt` seconds.
    ///
    /// A step that would put the robot's footprint inside a pillar or wall
    /// is not applied and is counted as a collision.
    pub fn step(&self, dt: f32) {
        let mut state = self.lock();
        let (linear, angular) = state.active;
        let yaw = wrap_angle(state.pose.yaw + angular * dt);
        let x = state.pose.x + linear * yaw.cos() * dt;
        let y = state.pose.y + linear * yaw.sin() * dt;
        state.pose.yaw = yaw;
        if blocked(&state.config, x, y) {
            state.collisions += 1;
            debug!(x, y, "simulated base blocked");
        } else {
            state.pose.x = x;
            state.pose.y = y;
        }
    }

    /// Render a range scan from the current pose.
    pub fn scan(&self) -> Vec<f32> {
        let state = self.lock();
        let cfg = &state.config;
        let SimPose { x, y, yaw } = state.pose;
        let n = cfg.scan_samples.max(1);
        (0..n)
            .map(|i| {
                let bearing = yaw + i as f32 * TAU / n as f32;
                let (dx, dy) = (bearing.cos(), bearing.sin());
                let mut range = wall_distance(cfg.arena_half_width, x, y, dx, dy);
                for pillar in &cfg.pillars {
                    if let Some(t) = ray_circle(x, y, dx, dy, pillar) {
                        range = range.min(t);
                    }
                }
                if range > cfg.max_range {
                    f32::INFINITY
                } else {
                    range
                }
            })
            .collect()
    }

    /// Render a camera frame from the current pose.
    pub fn frame(&self) -> ImageFrame {
        let state = self.lock();
        let cfg = &state.config;
        let pose = state.pose;
        let mut frame = ImageFrame::filled(cfg.image_width, cfg.image_height, cfg.background_bgr);
        let half_fov = cfg.horizontal_fov_deg.to_radians() / 2.0;
        let half_width = cfg.image_width as f32 / 2.0;

        // (relative bearing, angular half-width, distance, colour)
        let visible: Vec<(f32, f32, f32, [u8; 3])> = cfg
            .pillars
            .iter()
            .filter_map(|p| {
                let (dx, dy) = (p.x - pose.x, p.y - pose.y);
                let dist = dx.hypot(dy);
                if dist <= p.radius {
                    return None;
                }
                let bearing = wrap_angle(dy.atan2(dx) - pose.yaw);
                let half_angle = (p.radius / dist).asin();
                Some((bearing, half_angle, dist, p.bgr))
            })
            .collect();

        for col in 0..cfg.image_width {
            let offset = (half_width - (col as f32 + 0.5)) / half_width * half_fov;
            let nearest = visible
                .iter()
                .filter(|(bearing, half_angle, _, _)| (offset - bearing).abs() <= *half_angle)
                .min_by(|a, b| a.2.total_cmp(&b.2));
            if let Some(&(_, _, _, bgr)) = nearest {
                frame.fill_rect(col, 0, col + 1, cfg.image_height, bgr);
            }
        }
        frame
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn command(&self, command: MotionCommand) -> Result<(), BeaconError> {
        let mut state = self.lock();
        if state.pending_faults > 0 {
            state.pending_faults -= 1;
            return Err(BeaconError::ActuatorFault {
                component: "sim_drive_base".to_string(),
                details: format!("injected fault while executing {command:?}"),
            });
        }
        match command {
            MotionCommand::SetVelocity { linear, angular } => state.staged = (linear, angular),
            MotionCommand::Publish => state.active = state.staged,
            MotionCommand::Stop => {
                state.staged = (0.0, 0.0);
                state.active = (0.0, 0.0);
            }
            MotionCommand::RotateBy { degrees } => {
                state.pose.yaw = wrap_angle(state.pose.yaw + degrees.to_radians());
                state.active = (0.0, 0.0);
            }
        }
        debug!(?command, "simulated drive base command");
        state.commands.push(command);
        Ok(())
    }
}

fn blocked(cfg: &SimConfig, x: f32, y: f32) -> bool {
    let limit = cfg.arena_half_width - cfg.robot_radius;
    if x.abs() > limit || y.abs() > limit {
        return true;
    }
    cfg.pillars
        .iter()
        .any(|p| (p.x - x).hypot(p.y - y) < p.radius + cfg.robot_radius)
}

/// Distance along `(dx, dy)` from `(x, y)` to the arena wall.
fn wall_distance(half: f32, x: f32, y: f32, dx: f32, dy: f32) -> f32 {
    let axis = |pos: f32, dir: f32| {
        if dir > 1e-6 {
            (half - pos) / dir
        } else if dir < -1e-6 {
            (-half - pos) / dir
        } else {
            f32::INFINITY
        }
    };
    axis(x, dx).min(axis(y, dy))
}

/// Distance along the unit ray `(dx, dy)` from `(x, y)` to the pillar's
/// surface, or `None` when the ray misses.
fn ray_circle(x: f32, y: f32, dx: f32, dy: f32, pillar: &SimPillar) -> Option<f32> {
    let (ox, oy) = (pillar.x - x, pillar.y - y);
    let along = ox * dx + oy * dy;
    if along <= 0.0 {
        return None;
    }
    let perp_sq = ox * ox + oy * oy - along * along;
    let r_sq = pillar.radius * pillar.radius;
    if perp_sq > r_sq {
        return None;
    }
    Some((along - (r_sq - perp_sq).sqrt()).max(0.0))
}

// ────────────────────────────────────────────────────────────────────────────
// Drive base and odometry
// ────────────────────────────────────────────────────────────────────────────

/// Simulated differential-drive base.  Every accepted command is recorded
/// in the world's command log.
pub struct SimDriveBase {
    world: SimWorld,
}

impl MotionActuator for SimDriveBase {
    fn id(&self) -> &str {
        "sim_drive_base"
    }

    fn set_velocity(&mut self, linear: f32, angular: f32) -> Result<(), BeaconError> {
        self.world
            .command(MotionCommand::SetVelocity { linear, angular })
    }

    fn rotate_by(&mut self, degrees: f32) -> Result<(), BeaconError> {
        self.world.command(MotionCommand::RotateBy { degrees })
    }

    fn stop(&mut self) -> Result<(), BeaconError> {
        self.world.command(MotionCommand::Stop)
    }

    fn publish(&mut self) -> Result<(), BeaconError> {
        self.world.command(MotionCommand::Publish)
    }
}

/// Simulated odometry: exact pose, no drift.
pub struct SimOdometry {
    world: SimWorld,
    cached: Option<f32>,
}

impl Odometry for SimOdometry {
    fn yaw(&self) -> f32 {
        self.world.pose().yaw
    }

    fn position(&self) -> (f32, f32) {
        let pose = self.world.pose();
        (pose.x, pose.y)
    }

    fn cache_current_heading(&mut self) {
        self.cached = Some(self.yaw());
    }

    fn cached_heading(&self) -> Option<f32> {
        self.cached
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_arena() -> SimConfig {
        SimConfig {
            pillars: Vec::new(),
            ..SimConfig::default()
        }
    }

    #[test]
    fn velocity_applies_only_after_publish() {
        let world = SimWorld::new(empty_arena());
        let mut base = world.drive_base();
        base.set_velocity(0.5, 0.0).unwrap();
        world.step(1.0);
        assert_eq!(world.pose().x, 0.0);

        base.publish().unwrap();
        world.step(1.0);
        assert!((world.pose().x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn rotate_turns_instantly_and_halts() {
        let world = SimWorld::new(empty_arena());
        let mut base = world.drive_base();
        base.set_velocity(0.2, 0.0).unwrap();
        base.publish().unwrap();
        base.rotate_by(90.0).unwrap();
        assert!((world.pose().yaw - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
        assert_eq!(world.active_velocity(), (0.0, 0.0));
        assert_eq!(world.commands().len(), 3);
    }

    #[test]
    fn injected_faults_reject_commands() {
        let world = SimWorld::new(empty_arena());
        let mut base = world.drive_base();
        world.inject_actuator_faults(1);
        assert!(matches!(
            base.stop(),
            Err(BeaconError::ActuatorFault { .. })
        ));
        assert!(base.stop().is_ok());
        assert_eq!(world.commands(), [MotionCommand::Stop]);
    }

    #[test]
    fn scan_index_zero_faces_forward() {
        let world = SimWorld::new(SimConfig::default());
        let scan = world.scan();
        assert_eq!(scan.len(), 360);
        // Beacon surface: 2.0 m centre distance minus 0.15 m radius.
        assert!((scan[0] - 1.85).abs() < 1e-3, "got {}", scan[0]);
        // Start marker sits 0.6 m to the left (counter-clockwise, index 90).
        assert!((scan[90] - 0.5).abs() < 1e-3, "got {}", scan[90]);
    }

    #[test]
    fn scan_reports_no_return_beyond_max_range() {
        let world = SimWorld::new(empty_arena());
        let scan = world.scan();
        // The 45° diagonal reaches the corner at 3√2 m > 3.5 m.
        assert!(scan[45].is_infinite());
        assert!((scan[180] - 3.0).abs() < 1e-3);
    }

    #[test]
    fn frame_shows_pillar_at_centre_columns() {
        let world = SimWorld::new(SimConfig::default());
        let frame = world.frame();
        assert_eq!(frame.pixel(320, 240), [255, 0, 0]);
        assert_eq!(frame.pixel(5, 240), [90, 90, 90]);
    }

    #[test]
    fn pillar_left_of_heading_appears_left_of_centre() {
        let world = SimWorld::new(SimConfig::default());
        // Turn 10° right: the beacon ahead is now 10° to the left.
        world.set_pose(0.0, 0.0, -10.0);
        let frame = world.frame();
        let blue_cols: Vec<u32> = (0..frame.width)
            .filter(|&c| frame.pixel(c, 240) == [255, 0, 0])
            .collect();
        assert!(!blue_cols.is_empty());
        assert!(blue_cols.iter().all(|&c| c < 320));
    }

    #[test]
    fn step_into_pillar_counts_collision() {
        let world = SimWorld::new(SimConfig::default());
        world.set_pose(1.7, 0.0, 0.0);
        let mut base = world.drive_base();
        base.set_velocity(1.0, 0.0).unwrap();
        base.publish().unwrap();
        world.step(0.1);
        assert_eq!(world.collisions(), 1);
        assert!((world.pose().x - 1.7).abs() < 1e-6);
    }

    #[test]
    fn odometry_caches_heading() {
        let world = SimWorld::new(empty_arena());
        let mut odom = world.odometry();
        assert!(odom.cached_heading().is_none());
        odom.cache_current_heading();
        world.drive_base().rotate_by(-30.0).unwrap();
        let drift = odom.heading_drift().unwrap();
        assert!((drift + 30f32.to_radians()).abs() < 1e-5);
    }
}
