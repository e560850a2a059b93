//! Pointer-driven note resizing
//!
//! A drag starts on the tail cell of a placement. Pointer moves only record
//! the wanted length; the store is touched at most once per frame, and only
//! when the length actually changed.

use std::sync::Arc;

use crate::pattern::{Pattern, PlacementKey};
use crate::store::PatternStore;

/// Width of one grid step in pixels
pub const DEFAULT_STEP_WIDTH: f32 = 35.0;

#[derive(Debug, Clone, PartialEq)]
struct ResizeGesture {
    key: PlacementKey,
    origin_x: f32,
    original_length: u32,
    /// Length last written to the store
    applied: u32,
    /// Length requested by the latest pointer move, not yet written
    pending: Option<u32>,
}

/// Tracks the single active resize gesture
#[derive(Debug, Clone)]
pub struct Editor {
    step_width: f32,
    gesture: Option<ResizeGesture>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_WIDTH)
    }
}

impl Editor {
    pub fn new(step_width: f32) -> Self {
        Self {
            step_width: if step_width > 0.0 { step_width } else { DEFAULT_STEP_WIDTH },
            gesture: None,
        }
    }

    /// Placement currently being resized
    pub fn active(&self) -> Option<&PlacementKey> {
        self.gesture.as_ref().map(|g| &g.key)
    }

    /// Start resizing the placement of `name` whose tail is `step`.
    /// Any unfinished gesture is dropped first. Returns false when `step`
    /// is not a tail cell.
    pub fn begin_resize(&mut self, pattern: &Pattern, name: &str, step: u32, pointer_x: f32) -> bool {
        self.gesture = None;

        let Some(placement) = pattern.covering(name, step).filter(|p| p.tail() == step) else {
            return false;
        };

        self.gesture = Some(ResizeGesture {
            key: placement.key(),
            origin_x: pointer_x,
            original_length: placement.length,
            applied: placement.length,
            pending: None,
        });
        true
    }

    /// Record a pointer position; nothing is written until the next flush
    pub fn pointer_moved(&mut self, pointer_x: f32) {
        let step_width = self.step_width;
        let Some(gesture) = self.gesture.as_mut() else {
            return;
        };

        let delta_steps = ((pointer_x - gesture.origin_x) / step_width).round() as i64;
        let length = (gesture.original_length as i64 + delta_steps).clamp(1, u32::MAX as i64) as u32;

        gesture.pending = (length != gesture.applied).then_some(length);
    }

    /// Write the pending length, if any. Call once per frame.
    pub fn flush_frame(&mut self, store: &PatternStore) -> Option<Arc<Pattern>> {
        let gesture = self.gesture.as_mut()?;
        let length = gesture.pending.take()?;

        let pattern = store.resize_note(&gesture.key, length);
        match pattern.find(&gesture.key) {
            Some(placement) => gesture.applied = placement.length,
            // deleted under us
            None => self.gesture = None,
        }
        Some(pattern)
    }

    /// Flush and finish the gesture
    pub fn end_resize(&mut self, store: &PatternStore) -> Option<Arc<Pattern>> {
        let pattern = self.flush_frame(store);
        self.gesture = None;
        pattern
    }

    pub fn cancel(&mut self) {
        self.gesture = None;
    }
}
