//! Single-slot hand-off of scans from the sensor callback to the worker

use crate::common::types::Stamp;
use crate::perception::sensors::LaserScan;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Arc<LaserScan>>,
    last_stamp: Option<Stamp>,
}

/// Holds at most one scan waiting to be processed
///
/// A scan offered while another is pending is dropped, never queued.
#[derive(Debug, Default)]
pub struct ScanMailbox {
    slot: Mutex<Slot>,
}

impl ScanMailbox {
    pub fn new() -> Self {
        ScanMailbox::default()
    }

    /// Store `scan` unless one is already pending; returns whether it was kept
    ///
    /// The arrival stamp is recorded either way.
    pub fn offer(&self, scan: LaserScan) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.last_stamp = Some(scan.stamp);
        if slot.pending.is_some() {
            log::debug!("Worker busy, dropping scan stamped {}", scan.stamp);
            return false;
        }
        slot.pending = Some(Arc::new(scan));
        true
    }

    /// Pending scan, left in place
    pub fn peek(&self) -> Option<Arc<LaserScan>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .clone()
    }

    /// Empty the slot so the next scan can be accepted
    pub fn clear(&self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).pending = None;
    }

    pub fn is_empty(&self) -> bool {
        self.peek().is_none()
    }

    /// Stamp of the most recently offered scan, kept or not
    pub fn last_stamp(&self) -> Option<Stamp> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).last_stamp
    }
}
