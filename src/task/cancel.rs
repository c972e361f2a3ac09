// Cooperative cancellation with an interruptible wait

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Returned by [`CancelToken::pause`] when the wait was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait interrupted")]
pub struct Interrupted;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    interrupted: Mutex<bool>,
    wake: Condvar,
}

/// Shared flag polled by a task body at its checkpoints.
///
/// Cancelling only raises the flag. An interrupt additionally wakes a body
/// that is parked in [`CancelToken::pause`].
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, may_interrupt: bool) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if may_interrupt {
            self.interrupt();
        }
    }

    /// Wake the next (or current) pause without touching the cancel flag.
    pub fn interrupt(&self) {
        let mut interrupted = self.inner.interrupted.lock();
        *interrupted = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_interrupted(&self) -> bool {
        *self.inner.interrupted.lock()
    }

    /// Sleep for `duration` unless an interrupt arrives first.
    ///
    /// A pending interrupt is consumed by the pause that observes it.
    pub fn pause(&self, duration: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now() + duration;
        let mut interrupted = self.inner.interrupted.lock();

        loop {
            if *interrupted {
                *interrupted = false;
                return Err(Interrupted);
            }
            if self
                .inner
                .wake
                .wait_until(&mut interrupted, deadline)
                .timed_out()
            {
                if *interrupted {
                    *interrupted = false;
                    return Err(Interrupted);
                }
                return Ok(());
            }
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_pause_runs_to_completion() {
        let token = CancelToken::new();
        let started = Instant::now();
        assert_eq!(token.pause(Duration::from_millis(20)), Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_without_interrupt_does_not_wake() {
        let token = CancelToken::new();
        token.cancel(false);
        assert!(token.is_cancelled());
        assert!(!token.is_interrupted());
        assert_eq!(token.pause(Duration::from_millis(5)), Ok(()));
    }

    #[test]
    fn test_interrupt_wakes_pause() {
        let token = CancelToken::new();
        let remote = token.clone();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel(true);
        });

        let started = Instant::now();
        assert_eq!(token.pause(Duration::from_secs(10)), Err(Interrupted));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(token.is_cancelled());
        waker.join().unwrap();
    }

    #[test]
    fn test_interrupt_is_consumed() {
        let token = CancelToken::new();
        token.interrupt();
        assert_eq!(token.pause(Duration::from_millis(1)), Err(Interrupted));
        assert!(!token.is_interrupted());
        assert_eq!(token.pause(Duration::from_millis(1)), Ok(()));
    }
}
