//! Mounted guard shared by everything a mounted view spawns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Flag that flips to "unmounted" exactly once.
///
/// Async completions (fetches, writes, change events, retry timers) check
/// it before touching view state, so stale results are discarded after
/// teardown.
#[derive(Debug, Clone)]
pub struct MountGuard(Arc<AtomicBool>);

impl MountGuard {
    /// Creates a guard in the mounted state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_mounted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Marks the view unmounted. Returns true if it was mounted before.
    pub fn unmount(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Default for MountGuard {
    fn default() -> Self {
        Self::new()
    }
}
