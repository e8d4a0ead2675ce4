use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Re-render request shared between background tasks and the frame loop.
///
/// Background tasks call [`RedrawSignal::request`]. The frame loop either
/// polls [`RedrawSignal::take`] once per frame or sleeps on
/// [`RedrawSignal::wait`] while idle.
#[derive(Debug, Clone, Default)]
pub struct RedrawSignal {
    dirty: Arc<AtomicBool>,
    requested: Arc<AtomicU64>,
    notify: Arc<Notify>,
}

impl RedrawSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.fetch_add(1, Ordering::SeqCst);
        self.dirty.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Returns true if a redraw was requested since the last call.
    pub fn take(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    /// Total number of requests, used by tests and diagnostics.
    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }

    /// Wait until a redraw is requested. Returns immediately if a request
    /// happened since the last wakeup.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}
