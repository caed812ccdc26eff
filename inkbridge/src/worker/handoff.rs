//! Single-use hand-off cell bridging the async layout result into the
//! synchronous compile call.
//!
//! The original design used a process-wide named slot for this; here the
//! cell is a plain field of the worker, and its value is threaded into the
//! second compute call explicitly. The cell enforces its own lifecycle:
//! written once, taken once, empty again afterward. `put` on an occupied
//! cell or `take` on an empty one signals a protocol bug in the caller, and
//! stale values can never leak into a later compile.

use serde_json::Value;
use thiserror::Error;

/// Lifecycle violation on the hand-off cell.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum HandoffError {
    /// `put` was called while a previous layout was still unconsumed.
    #[error("hand-off cell already holds a layout")]
    Occupied,

    /// `take` was called before any layout was written.
    #[error("hand-off cell is empty")]
    Empty,
}

/// Write-once/take-once slot for one compile cycle's laid-out graph.
#[derive(Debug, Default)]
pub struct HandoffCell {
    slot: Option<Value>,
}

impl HandoffCell {
    /// Creates an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the laid-out graph. Fails if a value is already pending.
    pub fn put(&mut self, layout: Value) -> Result<(), HandoffError> {
        if self.slot.is_some() {
            return Err(HandoffError::Occupied);
        }
        self.slot = Some(layout);
        Ok(())
    }

    /// Takes the pending graph, leaving the cell empty.
    pub fn take(&mut self) -> Result<Value, HandoffError> {
        self.slot.take().ok_or(HandoffError::Empty)
    }

    /// True when no layout is pending.
    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}
