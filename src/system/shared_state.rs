//! Shared state between the frame loop and the operator loop.
//!
//! Only two values cross the thread boundary: the most recent corner distance
//! and the shutdown request. Both are plain atomics, so neither side ever
//! blocks the other.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Slot value meaning "no marker in the latest frame".
pub const NO_MARKER: f64 = -1.0;

/// Single-slot, last-write-wins register for the latest corner distance.
///
/// The f64 is stored as its bit pattern, so readers always see a whole value.
/// Reads do not clear the slot.
#[derive(Debug)]
pub struct MeasurementSlot {
    bits: AtomicU64,
}

impl MeasurementSlot {
    /// Create a slot holding the no-marker sentinel.
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(NO_MARKER.to_bits()),
        }
    }

    /// Overwrite the slot. `None`, NaN, infinities and negative values all
    /// store the sentinel.
    pub fn publish(&self, corner_distance: Option<f64>) {
        let value = match corner_distance {
            Some(d) if d.is_finite() && d >= 0.0 => d,
            _ => NO_MARKER,
        };
        self.bits.store(value.to_bits(), Ordering::SeqCst);
    }

    /// Raw slot contents: a distance `>= 0` or [`NO_MARKER`].
    pub fn read_raw(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }

    /// Latest corner distance, or `None` when no marker was visible.
    pub fn read(&self) -> Option<f64> {
        let value = self.read_raw();
        (value >= 0.0).then_some(value)
    }
}

impl Default for MeasurementSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by the frame loop and the operator loop.
#[derive(Debug, Default)]
pub struct SharedState {
    /// Latest corner distance. Written by the frame loop, read by the operator loop.
    pub corner_distance: MeasurementSlot,

    /// Cooperative cancellation token. Set once by the operator loop on exit,
    /// polled by the frame loop at the top of every iteration. Never reset.
    pub shutdown_requested: AtomicBool,
}

impl SharedState {
    /// Create a new SharedState with an empty slot and no shutdown request.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish the reduction of the latest frame.
    pub fn publish_corner_distance(&self, corner_distance: Option<f64>) {
        self.corner_distance.publish(corner_distance);
    }

    /// Read the latest corner distance without clearing it.
    pub fn latest_corner_distance(&self) -> Option<f64> {
        self.corner_distance.read()
    }

    /// Request shutdown of the frame loop.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    /// Check if shutdown was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_slot_starts_empty() {
        let slot = MeasurementSlot::new();
        assert_eq!(slot.read(), None);
        assert_eq!(slot.read_raw(), NO_MARKER);
    }

    #[test]
    fn test_last_write_wins_and_reads_do_not_clear() {
        let slot = MeasurementSlot::new();
        slot.publish(Some(12.0));
        slot.publish(Some(87.5));
        assert_eq!(slot.read(), Some(87.5));
        assert_eq!(slot.read(), Some(87.5));
        slot.publish(None);
        assert_eq!(slot.read(), None);
        assert_eq!(slot.read_raw(), NO_MARKER);
    }

    #[test]
    fn test_out_of_domain_values_become_sentinel() {
        let slot = MeasurementSlot::new();
        for bad in [f64::NAN, f64::INFINITY, -0.5, -1.0] {
            slot.publish(Some(10.0));
            slot.publish(Some(bad));
            assert_eq!(slot.read(), None, "value {bad} should not be readable");
        }
        slot.publish(Some(0.0));
        assert_eq!(slot.read(), Some(0.0));
    }

    #[test]
    fn test_concurrent_reader_never_sees_torn_value() {
        let shared = SharedState::new();
        let writer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for i in 0..20_000 {
                    let v = if i % 2 == 0 { Some(123.456) } else { None };
                    shared.publish_corner_distance(v);
                }
                shared.request_shutdown();
            })
        };
        while !shared.is_shutdown_requested() {
            let raw = shared.corner_distance.read_raw();
            assert!(raw == 123.456 || raw == NO_MARKER, "torn read: {raw}");
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_shutdown_flag_is_sticky() {
        let shared = SharedState::new();
        assert!(!shared.is_shutdown_requested());
        shared.request_shutdown();
        shared.request_shutdown();
        assert!(shared.is_shutdown_requested());
    }
}
