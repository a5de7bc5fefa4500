//! Shared state between the fusion cycle and its consumers.
//!
//! The fusion cycle is the only writer of [`FusedData`]; everything
//! else reads whole-struct snapshots. Corrections flow the other way
//! through a one-shot mailbox that the fusion cycle drains exactly
//! once per cycle.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::core::types::FusedData;

/// Externally requested pose corrections, consumed in one cycle.
///
/// `None` fields leave the corresponding value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorrectionRequest {
    /// Replace the heading (rad, unwrapped).
    pub heading: Option<f32>,
    /// Replace the x position (cm).
    pub x: Option<f32>,
    /// Replace the y position (cm).
    pub y: Option<f32>,
    /// Zero the pitch and pitch rate.
    pub zero_pitch: bool,
    /// Discard the in-progress record of the current cell.
    pub clear_cell: bool,
}

impl CorrectionRequest {
    /// Fold a later request into this one. Scalar replacements take
    /// the newer value, flags accumulate.
    pub(crate) fn merge(&mut self, other: CorrectionRequest) {
        if other.heading.is_some() {
            self.heading = other.heading;
        }
        if other.x.is_some() {
            self.x = other.x;
        }
        if other.y.is_some() {
            self.y = other.y;
        }
        self.zero_pitch |= other.zero_pitch;
        self.clear_cell |= other.clear_cell;
    }
}

/// Handle to the shared fused state. Cheap to clone.
#[derive(Clone, Default)]
pub struct SharedFusedData {
    data: Arc<RwLock<FusedData>>,
    corrections: Arc<Mutex<Option<CorrectionRequest>>>,
}

impl SharedFusedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy out the latest published state. Never observes a
    /// half-written update.
    pub fn snapshot(&self) -> FusedData {
        *self.data.read()
    }

    /// Publish a new state, replacing the previous one whole.
    pub fn publish(&self, data: FusedData) {
        *self.data.write() = data;
    }

    /// Queue a correction for the next fusion cycle. Requests posted
    /// between cycles merge rather than overwrite.
    pub fn post_correction(&self, request: CorrectionRequest) {
        let mut slot = self.corrections.lock();
        match slot.as_mut() {
            Some(pending) => pending.merge(request),
            None => *slot = Some(request),
        }
    }

    /// Drain the pending correction, leaving the mailbox empty.
    pub fn take_correction(&self) -> Option<CorrectionRequest> {
        self.corrections.lock().take()
    }
}
