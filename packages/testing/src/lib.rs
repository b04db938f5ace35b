#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in graph_yield.

use std::panic;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rand::Rng;

/// How long [`with_watchdog()`] lets a test run before declaring it hung.
///
/// Miri is dramatically slower for thread synchronization, so it gets a longer budget.
#[must_use]
pub fn default_watchdog_timeout() -> Duration {
    if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    }
}

/// Runs a test with a timeout so that a lost wakeup fails the test instead of hanging it.
///
/// A deadlock is the failure mode of a broken handshake, so every test that blocks on another
/// thread should run under a watchdog.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled
/// and the test function is executed directly, so that mutation testing can detect hanging
/// mutations on its own terms.
///
/// # Panics
///
/// Panics if the test exceeds [`default_watchdog_timeout()`] or if the test itself panics.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    with_watchdog_timeout(default_watchdog_timeout(), test_fn)
}

/// Like [`with_watchdog()`] but with a custom timeout.
///
/// # Panics
///
/// Panics if the test exceeds `timeout` or if the test itself panics.
pub fn with_watchdog_timeout<F, R>(timeout: Duration, test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        // If sending fails, the watchdog has already given up on us.
        drop(tx.send(test_fn()));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_thread.join().expect("test thread completed so cannot have panicked");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {timeout:?} - a thread is probably waiting for a lost signal");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread disconnected without a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Sleeps for a random duration of up to `max`, or only yields the thread half of the time.
///
/// Sprinkled between the steps of a concurrent protocol, this shakes up the interleavings
/// that a stress test explores.
pub fn jitter(max: Duration) {
    let mut rng = rand::rng();

    if rng.random_bool(0.5) {
        thread::yield_now();
        return;
    }

    let max_micros = u64::try_from(max.as_micros()).unwrap_or(u64::MAX);
    thread::sleep(Duration::from_micros(rng.random_range(0..=max_micros)));
}
