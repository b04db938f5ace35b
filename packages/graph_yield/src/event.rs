//! Reusable binary events.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// A reusable binary latch that can be signaled, waited on and reset, potentially across
/// threads.
///
/// Signaling is a broadcast: every thread blocked in a wait on the event is released, and the
/// event stays signaled until it is reset. The only operation that clears the signal as part
/// of observing it is [`wait_and_reset()`][Self::wait_and_reset], which does so under the same
/// lock that observed the signal, so no other waiter can slip in between.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
///
/// use graph_yield::Event;
///
/// let event = Arc::new(Event::new());
///
/// let worker = thread::spawn({
///     let event = Arc::clone(&event);
///     move || event.signal()
/// });
///
/// event.wait_and_reset();
/// assert!(!event.is_signaled());
///
/// worker.join().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct Event {
    signaled: Mutex<bool>,
    changed: Condvar,
}

impl Event {
    /// Creates a new event in the unsignaled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signaled: Mutex::new(false),
            changed: Condvar::new(),
        }
    }

    /// Sets the event to signaled and releases every waiter.
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.changed.notify_all();
    }

    /// Clears the signal unconditionally.
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    /// Whether the event is currently signaled.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Blocks until the event is signaled. Does not clear the signal.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();

        while !*signaled {
            self.changed.wait(&mut signaled);
        }
    }

    /// Blocks until the event is signaled, then clears the signal before returning.
    pub fn wait_and_reset(&self) {
        let mut signaled = self.signaled.lock();

        while !*signaled {
            self.changed.wait(&mut signaled);
        }

        *signaled = false;
    }

    /// Blocks until the event is signaled or the timeout elapses.
    ///
    /// Returns `true` if the event was signaled. Does not clear the signal.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signaled = self.signaled.lock();
        self.wait_until_signaled(&mut signaled, timeout)
    }

    /// Blocks until the event is signaled or the timeout elapses, clearing the signal if it
    /// was observed.
    ///
    /// Returns `true` if the event was signaled (and has now been reset).
    #[must_use]
    pub fn wait_and_reset_timeout(&self, timeout: Duration) -> bool {
        let mut signaled = self.signaled.lock();

        if !self.wait_until_signaled(&mut signaled, timeout) {
            return false;
        }

        *signaled = false;
        true
    }

    fn wait_until_signaled(
        &self,
        signaled: &mut MutexGuard<'_, bool>,
        timeout: Duration,
    ) -> bool {
        // Spurious wakeups are possible, so we track the deadline ourselves.
        let deadline = Instant::now().checked_add(timeout);

        while !**signaled {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(signaled, deadline).timed_out() {
                        return **signaled;
                    }
                }
                // The timeout is so large it cannot be represented; treat it as infinite.
                None => self.changed.wait(signaled),
            }
        }

        true
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use static_assertions::assert_impl_all;
    use testing::with_watchdog;

    use super::*;

    assert_impl_all!(Event: Send, Sync);

    #[test]
    fn starts_unsignaled() {
        let event = Event::new();

        assert!(!event.is_signaled());
    }

    #[test]
    fn wait_does_not_clear_signal() {
        let event = Event::new();
        event.signal();

        event.wait();
        event.wait();

        assert!(event.is_signaled());
    }

    #[test]
    fn wait_and_reset_clears_signal() {
        let event = Event::new();
        event.signal();

        event.wait_and_reset();

        assert!(!event.is_signaled());
    }

    #[test]
    fn reset_clears_signal() {
        let event = Event::new();
        event.signal();

        event.reset();

        assert!(!event.is_signaled());
    }

    #[test]
    fn reset_of_unsignaled_event_is_noop() {
        let event = Event::new();

        event.reset();

        assert!(!event.is_signaled());
    }

    #[test]
    fn wait_timeout_expires_when_unsignaled() {
        let event = Event::new();

        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wait_and_reset_timeout_leaves_unsignaled_on_expiry() {
        let event = Event::new();

        assert!(!event.wait_and_reset_timeout(Duration::from_millis(10)));
        assert!(!event.is_signaled());
    }

    #[test]
    fn wait_and_reset_timeout_consumes_signal() {
        let event = Event::new();
        event.signal();

        assert!(event.wait_and_reset_timeout(Duration::from_millis(10)));
        assert!(!event.is_signaled());
    }

    #[test]
    fn huge_timeout_still_observes_signal() {
        let event = Event::new();
        event.signal();

        assert!(event.wait_timeout(Duration::MAX));
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn signal_releases_waiter_on_other_thread() {
        with_watchdog(|| {
            let event = Arc::new(Event::new());

            let waiter = thread::spawn({
                let event = Arc::clone(&event);
                move || event.wait_and_reset()
            });

            event.signal();
            waiter.join().unwrap();

            assert!(!event.is_signaled());
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn signal_broadcasts_to_all_waiters() {
        with_watchdog(|| {
            const WAITERS: usize = 4;

            let event = Arc::new(Event::new());
            let released = Arc::new(AtomicUsize::new(0));

            let waiters = (0..WAITERS)
                .map(|_| {
                    let event = Arc::clone(&event);
                    let released = Arc::clone(&released);

                    thread::spawn(move || {
                        event.wait();
                        released.fetch_add(1, Ordering::Relaxed);
                    })
                })
                .collect::<Vec<_>>();

            event.signal();

            for waiter in waiters {
                waiter.join().unwrap();
            }

            assert_eq!(released.load(Ordering::Relaxed), WAITERS);
        });
    }
}
