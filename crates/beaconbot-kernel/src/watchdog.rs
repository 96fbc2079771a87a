//! [`Watchdog`] – sensor stream health monitor.
//!
//! Each sensor stream (range scan, camera) is registered with a timeout and
//! heartbeated whenever a new sample is seen.  A stream whose deadline has
//! passed is *stale*.
//!
//! Staleness is reported edge-triggered: [`Watchdog::newly_timed_out`]
//! returns a component only once per silence, and
//! [`Watchdog::heartbeat`] tells the caller when a stale component has come
//! back, so a supervisor loop polling every tick logs each outage exactly
//! once.

use std::collections::HashMap;
use std::time::{Duration, Instant};

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

struct ComponentEntry {
    last_heartbeat: Instant,
    timeout: Duration,
    reported_stale: bool,
}

impl ComponentEntry {
    fn expired(&self) -> bool {
        self.last_heartbeat.elapsed() > self.timeout
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// Tracks heartbeats from registered sensor streams.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use beaconbot_kernel::watchdog::Watchdog;
///
/// let mut wd = Watchdog::new();
/// wd.register("lidar", Duration::from_secs(1));
/// assert!(!wd.heartbeat("lidar"));
///
/// assert!(wd.newly_timed_out().is_empty());
/// ```
#[derive(Default)]
pub struct Watchdog {
    components: HashMap<String, ComponentEntry>,
}

impl Watchdog {
    /// Create an empty watchdog with no registered components.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component_id` with a maximum heartbeat `timeout`.
    ///
    /// The deadline starts now.  Re-registering resets it.
    pub fn register(&mut self, component_id: &str, timeout: Duration) {
        self.components.insert(
            component_id.to_string(),
            ComponentEntry {
                last_heartbeat: Instant::now(),
                timeout,
                reported_stale: false,
            },
        );
    }

    /// Record a heartbeat for `component_id`, resetting its deadline.
    ///
    /// Returns `true` when the component had been reported stale by
    /// [`newly_timed_out`][Self::newly_timed_out] and is now back.
    /// Unregistered components are ignored.
    pub fn heartbeat(&mut self, component_id: &str) -> bool {
        match self.components.get_mut(component_id) {
            Some(entry) => {
                entry.last_heartbeat = Instant::now();
                std::mem::take(&mut entry.reported_stale)
            }
            None => false,
        }
    }

    /// Return the IDs of components whose deadline has passed since their
    /// last heartbeat and that have not been returned for this silence yet.
    /// Returned components are marked stale until their next heartbeat.
    /// The order of the returned list is unspecified.
    pub fn newly_timed_out(&mut self) -> Vec<String> {
        let mut stale = Vec::new();
        for (id, entry) in &mut self.components {
            if !entry.reported_stale && entry.expired() {
                entry.reported_stale = true;
                stale.push(id.clone());
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_component_is_not_stale() {
        let mut wd = Watchdog::new();
        wd.register("lidar", Duration::from_secs(5));
        assert!(wd.newly_timed_out().is_empty());
    }

    #[test]
    fn heartbeat_resets_deadline() {
        let mut wd = Watchdog::new();
        wd.register("camera", Duration::from_millis(40));
        thread::sleep(Duration::from_millis(20));
        assert!(!wd.heartbeat("camera"));
        thread::sleep(Duration::from_millis(20));
        assert!(wd.newly_timed_out().is_empty());
    }

    #[test]
    fn only_silent_components_time_out() {
        let mut wd = Watchdog::new();
        wd.register("lidar", Duration::from_millis(20));
        wd.register("camera", Duration::from_secs(60));

        thread::sleep(Duration::from_millis(30));

        assert_eq!(wd.newly_timed_out(), vec!["lidar".to_string()]);
    }

    #[test]
    fn staleness_is_reported_once_until_recovery() {
        let mut wd = Watchdog::new();
        wd.register("lidar", Duration::from_millis(20));
        thread::sleep(Duration::from_millis(30));

        assert_eq!(wd.newly_timed_out(), vec!["lidar".to_string()]);
        assert!(wd.newly_timed_out().is_empty());

        assert!(wd.heartbeat("lidar"), "heartbeat after a reported outage is a recovery");
        assert!(!wd.heartbeat("lidar"));
        assert!(wd.newly_timed_out().is_empty());

        thread::sleep(Duration::from_millis(30));
        assert_eq!(wd.newly_timed_out(), vec!["lidar".to_string()]);
    }

    #[test]
    fn heartbeat_on_unknown_component_is_noop() {
        let mut wd = Watchdog::new();
        assert!(!wd.heartbeat("ghost"));
        assert!(wd.newly_timed_out().is_empty());
    }

    #[test]
    fn reregister_resets_timer() {
        let mut wd = Watchdog::new();
        wd.register("camera", Duration::from_millis(20));
        thread::sleep(Duration::from_millis(30));
        wd.register("camera", Duration::from_secs(60));
        assert!(wd.newly_timed_out().is_empty());
    }
}
