use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// Cooperative cancellation shared between a running session and whoever
/// controls it.
///
/// `request` is idempotent and wakes a session sleeping in [`wait`](Self::wait)
/// so a stop takes effect within one frame rather than after the full delay.
#[derive(Clone)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        let _ = self.wake_tx.try_send(());
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleeps up to `delay`. Returns `true` if a stop was requested.
    pub fn wait(&self, delay: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        match self.wake_rx.recv_timeout(delay) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.is_requested()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_new_signal_is_not_requested() {
        let stop = StopSignal::new();
        assert!(!stop.is_requested());
        assert!(!stop.wait(Duration::from_millis(1)));
    }

    #[test]
    fn test_request_is_visible_through_clones() {
        let stop = StopSignal::new();
        let handle = stop.clone();
        handle.request();
        assert!(stop.is_requested());
        assert!(stop.wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_request_is_idempotent() {
        let stop = StopSignal::new();
        stop.request();
        stop.request();
        stop.request();
        assert!(stop.is_requested());
    }

    #[test]
    fn test_request_wakes_waiter_early() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let started = Instant::now();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.request();
        });
        assert!(stop.wait(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        waker.join().unwrap();
    }
}
