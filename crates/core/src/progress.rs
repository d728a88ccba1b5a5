//! Coarse progress reporting for long-running sync operations.

use tracing::{debug, info};

/// Receives phase updates from the orchestrators and the git engine.
///
/// `max <= 0` or `current < 0` means the total is unknown.
pub trait Progress {
    fn on_progress(&self, current: i64, max: i64, message: &str);
    fn on_indeterminate(&self);
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn on_progress(&self, _current: i64, _max: i64, _message: &str) {}
    fn on_indeterminate(&self) {}
}

/// Forwards updates to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn on_progress(&self, current: i64, max: i64, message: &str) {
        if is_indeterminate(current, max) {
            info!(phase = message, "progress");
        } else {
            debug!(phase = message, current, max, "progress");
        }
    }

    fn on_indeterminate(&self) {
        debug!("progress indeterminate");
    }
}

/// Whether a `(current, max)` pair carries no usable total.
pub fn is_indeterminate(current: i64, max: i64) -> bool {
    max <= 0 || current < 0
}
