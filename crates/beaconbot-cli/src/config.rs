//! Run configuration – reads/writes `~/.beaconbot/config.toml`.
//!
//! Every section is optional in the file; missing keys take their defaults.
//! `BEACONBOT_*` environment variables are applied on top of whatever was
//! loaded.

use std::fs;
use std::path::{Path, PathBuf};

use beaconbot_hal::sim::SimConfig;
use beaconbot_kernel::{AvoidanceConfig, MotionLimits};
use beaconbot_perception::{RoiConfig, SectorConfig};
use beaconbot_runtime::{
    AcquisitionConfig, BeaconingConfig, ControlConfig, ControlLoopConfig, SimFeedConfig,
};
use beaconbot_types::{BeaconError, ColorCatalog};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Persisted configuration of a simulated beaconing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub control: ControlConfig,
    pub acquisition: AcquisitionConfig,
    pub beaconing: BeaconingConfig,
    pub avoidance: AvoidanceConfig,
    pub sectors: SectorConfig,
    pub roi: RoiConfig,
    pub limits: MotionLimits,
    pub feed: SimFeedConfig,
    pub sim: SimConfig,
    pub catalog: ColorCatalog,
}

impl Config {
    /// The subset the control loop consumes.
    pub fn control_loop(&self) -> ControlLoopConfig {
        ControlLoopConfig {
            control: self.control,
            acquisition: self.acquisition,
            avoidance: self.avoidance,
            beaconing: self.beaconing,
            catalog: self.catalog.clone(),
        }
    }

    /// Reject values the run cannot work with.
    pub fn validate(&self) -> Result<(), BeaconError> {
        if !(self.control.tick_hz.is_finite() && self.control.tick_hz > 0.0) {
            return Err(BeaconError::Config(format!(
                "control.tick_hz must be positive, got {}",
                self.control.tick_hz
            )));
        }
        if !(self.feed.physics_hz.is_finite() && self.feed.physics_hz > 0.0) {
            return Err(BeaconError::Config(format!(
                "feed.physics_hz must be positive, got {}",
                self.feed.physics_hz
            )));
        }
        if self.catalog.is_empty() {
            return Err(BeaconError::Config("catalog has no colours".to_string()));
        }
        if self.sim.scan_samples == 0 {
            return Err(BeaconError::Config("sim.scan_samples must be non-zero".to_string()));
        }
        if self.sim.image_width == 0 || self.sim.image_height == 0 {
            return Err(BeaconError::Config(format!(
                "sim image must not be empty, got {}x{}",
                self.sim.image_width, self.sim.image_height
            )));
        }
        self.validate_motion()
    }

    /// Reject speeds and turns the motion gate would refuse mid-run.
    fn validate_motion(&self) -> Result<(), BeaconError> {
        let speed = self.beaconing.speed;
        if !(speed.is_finite() && speed > 0.0 && speed <= self.limits.max_linear) {
            return Err(BeaconError::Config(format!(
                "beaconing.speed must be in (0, {}], got {speed}",
                self.limits.max_linear
            )));
        }

        let cap = self.limits.max_rotation_degrees;
        let turns = [
            ("beaconing.align_step_degrees", self.beaconing.align_step_degrees),
            // A sweep swings from one edge to the other.
            ("beaconing.sweep_degrees * 2", self.beaconing.sweep_degrees * 2.0),
            // Steering corrections are at most half a unit.
            ("beaconing.steer_gain_degrees * 0.5", self.beaconing.steer_gain_degrees * 0.5),
            ("acquisition.selection_turn_degrees", self.acquisition.selection_turn_degrees),
            ("avoidance.turn_degrees", self.avoidance.turn_degrees),
        ];
        for (name, degrees) in turns {
            if !degrees.is_finite() || degrees.abs() > cap {
                return Err(BeaconError::Config(format!(
                    "{name} is {degrees}, above the {cap}° rotation cap"
                )));
            }
        }
        Ok(())
    }
}

/// Return the path to `~/.beaconbot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".beaconbot").join("config.toml")
}

/// Load and validate the config at `path`, with environment overrides
/// applied.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, BeaconError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        BeaconError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| {
        BeaconError::Config(format!("failed to parse {}: {e}", path.display()))
    })?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Apply `BEACONBOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `BEACONBOT_TICK_HZ` | `control.tick_hz` |
/// | `BEACONBOT_SPEED` | `beaconing.speed` |
/// | `BEACONBOT_FRONT_THRESHOLD` | `avoidance.front_distance_threshold` |
/// | `BEACONBOT_STOP_DISTANCE` | `beaconing.stop_distance_threshold` |
///
/// Values that are not positive finite numbers are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |name| std::env::var(name).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let positive = |name: &str| -> Option<f64> {
        let raw = lookup(name)?;
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => Some(v),
            _ => {
                warn!(variable = name, value = %raw, "ignoring invalid override");
                None
            }
        }
    };

    if let Some(v) = positive("BEACONBOT_TICK_HZ") {
        cfg.control.tick_hz = v;
    }
    if let Some(v) = positive("BEACONBOT_SPEED") {
        cfg.beaconing.speed = v as f32;
    }
    if let Some(v) = positive("BEACONBOT_FRONT_THRESHOLD") {
        cfg.avoidance.front_distance_threshold = v as f32;
    }
    if let Some(v) = positive("BEACONBOT_STOP_DISTANCE") {
        cfg.beaconing.stop_distance_threshold = v as f32;
    }
}

/// Write `cfg` to `path`, creating parent directories as needed.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), BeaconError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            BeaconError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| BeaconError::Config(format!("failed to serialise config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| BeaconError::Config(format!("failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn config_path_points_to_beaconbot_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.beaconbot/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");

        assert_eq!(loaded.catalog, ColorCatalog::default());
        assert_eq!(loaded.sim, SimConfig::default());
        assert_eq!(loaded.beaconing, BeaconingConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("partial.toml");
        fs::write(
            &path,
            "[beaconing]\nspeed = 0.1\n\n[[catalog]]\nname = \"Blue\"\nlower = [115, 224, 100]\nupper = [130, 255, 255]\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.beaconing.speed, 0.1);
        assert_eq!(cfg.beaconing.search_grace_ticks, 40);
        assert_eq!(cfg.catalog.len(), 1);
        assert!(cfg.catalog.get("Blue").is_some());
        assert_eq!(cfg.control, ControlConfig::default());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[control\ntick_hz = ").unwrap();

        assert!(matches!(load_from(&path), Err(BeaconError::Config(_))));
    }

    #[test]
    fn validation_rejects_empty_catalog_and_zero_rate() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_ok());

        cfg.control.tick_hz = 0.0;
        assert!(cfg.validate().is_err());

        let cfg = Config {
            catalog: ColorCatalog::new(Vec::new()),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(BeaconError::Config(msg)) if msg.contains("catalog")));
    }

    fn rejected_for(cfg: &Config, field: &str) -> bool {
        matches!(cfg.validate(), Err(BeaconError::Config(msg)) if msg.contains(field))
    }

    #[test]
    fn speed_above_linear_cap_is_rejected() {
        let mut cfg = Config::default();
        cfg.beaconing.speed = cfg.limits.max_linear;
        assert!(cfg.validate().is_ok());

        cfg.beaconing.speed = cfg.limits.max_linear + 0.01;
        assert!(rejected_for(&cfg, "beaconing.speed"));

        cfg.beaconing.speed = 0.0;
        assert!(rejected_for(&cfg, "beaconing.speed"));
    }

    #[test]
    fn align_step_above_rotation_cap_is_rejected() {
        let mut cfg = Config::default();
        cfg.beaconing.align_step_degrees = cfg.limits.max_rotation_degrees + 1.0;
        assert!(rejected_for(&cfg, "align_step_degrees"));
    }

    #[test]
    fn full_sweep_must_fit_the_rotation_cap() {
        let mut cfg = Config::default();
        cfg.limits.max_rotation_degrees = 90.0;
        cfg.acquisition.selection_turn_degrees = 90.0;
        cfg.beaconing.sweep_degrees = 45.0;
        assert!(cfg.validate().is_ok());

        cfg.beaconing.sweep_degrees = 50.0;
        assert!(rejected_for(&cfg, "sweep_degrees"));
    }

    #[test]
    fn largest_steering_turn_must_fit_the_rotation_cap() {
        let mut cfg = Config::default();
        cfg.beaconing.steer_gain_degrees = cfg.limits.max_rotation_degrees * 2.0;
        assert!(cfg.validate().is_ok());

        cfg.beaconing.steer_gain_degrees += 4.0;
        assert!(rejected_for(&cfg, "steer_gain_degrees"));
    }

    #[test]
    fn selection_turn_above_rotation_cap_is_rejected() {
        let mut cfg = Config::default();
        cfg.acquisition.selection_turn_degrees = -(cfg.limits.max_rotation_degrees + 10.0);
        assert!(rejected_for(&cfg, "selection_turn_degrees"));
    }

    #[test]
    fn avoidance_turn_above_rotation_cap_is_rejected() {
        let mut cfg = Config::default();
        cfg.avoidance.turn_degrees = cfg.limits.max_rotation_degrees + 1.0;
        assert!(rejected_for(&cfg, "avoidance.turn_degrees"));
    }

    #[test]
    fn speed_override_above_cap_fails_validation() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, lookup(&[("BEACONBOT_SPEED", "0.5")]));
        assert_eq!(cfg.beaconing.speed, 0.5);
        assert!(rejected_for(&cfg, "beaconing.speed"));
    }

    #[test]
    fn file_with_speed_above_cap_fails_to_load() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("fast.toml");
        fs::write(&path, "[beaconing]\nspeed = 1.0\n").unwrap();

        assert!(matches!(load_from(&path), Err(BeaconError::Config(msg)) if msg.contains("speed")));
    }

    #[test]
    fn overrides_replace_their_fields() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup(&[
                ("BEACONBOT_TICK_HZ", "10"),
                ("BEACONBOT_SPEED", "0.15"),
                ("BEACONBOT_FRONT_THRESHOLD", "0.5"),
                ("BEACONBOT_STOP_DISTANCE", " 0.25 "),
            ]),
        );
        assert_eq!(cfg.control.tick_hz, 10.0);
        assert_eq!(cfg.beaconing.speed, 0.15);
        assert_eq!(cfg.avoidance.front_distance_threshold, 0.5);
        assert_eq!(cfg.beaconing.stop_distance_threshold, 0.25);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup(&[
                ("BEACONBOT_TICK_HZ", "fast"),
                ("BEACONBOT_SPEED", "-0.2"),
                ("BEACONBOT_STOP_DISTANCE", "NaN"),
            ]),
        );
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn apply_env_overrides_reads_process_environment() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("BEACONBOT_FRONT_THRESHOLD", "0.45") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.avoidance.front_distance_threshold, 0.45);
        unsafe { std::env::remove_var("BEACONBOT_FRONT_THRESHOLD") };
    }
}
