use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Session-wide cancellation flag
///
/// Clones share the flag. Cancelling stops new work from being admitted;
/// requests already in flight run to completion or time out.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag before starting another pass
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
