//! Versioned latest-value cell shared between a producer and its readers.
//!
//! Sensor callbacks run at sensor-determined rates while the control loop
//! ticks at its own rate.  A [`SnapshotCell`] decouples the two: the
//! producer publishes whole values, and every reader sees either the old
//! value or the new one, never a mix of the two.
//!
//! Built on [`tokio::sync::watch`].  The write lock is held only for the
//! duration of the value swap, and readers clone the value out before
//! doing any processing, so neither side waits on the other's work.
//!
//! # Example
//!
//! ```rust
//! use beaconbot_middleware::snapshot::SnapshotCell;
//!
//! let cell = SnapshotCell::new(0.0_f32);
//! let reader = cell.reader();
//! assert_eq!(reader.version(), 0);
//!
//! cell.publish(1.5);
//! assert_eq!(reader.current(), 1.5);
//! assert_eq!(reader.version(), 1);
//! ```

use std::sync::Arc;

use tokio::sync::watch;

/// A published value together with its publish counter.
///
/// Version `0` is the initial value installed at construction; every
/// [`SnapshotCell::publish`] increments it by one.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Producer side of a snapshot.  Cloning shares the same underlying cell.
pub struct SnapshotCell<T> {
    tx: Arc<watch::Sender<Versioned<T>>>,
}

impl<T> Clone for SnapshotCell<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone> SnapshotCell<T> {
    /// Create a cell holding `initial` at version 0.
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(Versioned {
            version: 0,
            value: initial,
        });
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current value wholesale and return its new version.
    pub fn publish(&self, value: T) -> u64 {
        let mut version = 0;
        self.tx.send_modify(|slot| {
            slot.version += 1;
            slot.value = value;
            version = slot.version;
        });
        version
    }

    /// Copy of the most recently published value and its version.
    pub fn latest(&self) -> Versioned<T> {
        self.tx.borrow().clone()
    }

    /// Hand out a read-only view of this cell.
    pub fn reader(&self) -> SnapshotReader<T> {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Consumer side of a snapshot.  Never blocks waiting for a new value.
pub struct SnapshotReader<T> {
    rx: watch::Receiver<Versioned<T>>,
}

impl<T> Clone for SnapshotReader<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T: Clone> SnapshotReader<T> {
    /// Copy of the most recently published value.
    pub fn current(&self) -> T {
        self.rx.borrow().value.clone()
    }

    /// Copy of the most recently published value and its version.
    pub fn latest(&self) -> Versioned<T> {
        self.rx.borrow().clone()
    }

    /// Version of the most recently published value.
    pub fn version(&self) -> u64 {
        self.rx.borrow().version
    }
}
