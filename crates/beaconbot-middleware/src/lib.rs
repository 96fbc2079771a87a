//! `beaconbot-middleware` – data plumbing between sensors and the controller.
//!
//! Moves data between asynchronous producers and the periodic control loop
//! without caring about the data's meaning.
//!
//! # Modules
//!
//! - [`snapshot`] – [`SnapshotCell`]: a versioned, tear-free latest-value
//!   cell.  Sensor callbacks publish whole values; the control loop reads one
//!   snapshot per tick.
//! - [`bus`] – [`EventBus`]: topic-based publish/subscribe for phase changes,
//!   motion commands and alerts, built on Tokio broadcast channels.

pub mod bus;
pub mod snapshot;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use snapshot::{SnapshotCell, SnapshotReader, Versioned};
