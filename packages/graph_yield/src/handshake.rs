//! The two-event rendezvous between a worker and the orchestrating thread.

use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::{EventId, EventPool, MessageQueue};

/// What a suspended worker receives when it is released.
#[derive(Debug, Eq, PartialEq)]
pub enum Resumption<T> {
    /// The orchestrator supplied replacement values, in output order.
    Resumed(Vec<T>),

    /// The orchestrator requested termination. No values were supplied.
    Terminated,
}

/// Handshake state shared by one worker and one orchestrating thread.
///
/// This owns the only mutable state involved in a suspension: the two protocol events,
/// the queue that carries values in both directions and the termination flag. Operators
/// that suspend are stateless and reach this through their run context, so a fresh
/// operator instance per run observes the same handshake.
///
/// One suspend/resume cycle goes as follows:
///
/// 1. The worker calls [`suspend()`][Self::suspend] with the values it yields. They are pushed
///    onto the queue, the worker announces the suspension and blocks.
/// 2. The orchestrator returns from [`wait_for_suspend()`][Self::wait_for_suspend] and takes
///    the yielded values with [`drain_yielded()`][Self::drain_yielded].
/// 3. The orchestrator either supplies replacement values with
///    [`supply_resume_values()`][Self::supply_resume_values] followed by
///    [`signal_resume()`][Self::signal_resume], or calls
///    [`signal_terminate_and_resume()`][Self::signal_terminate_and_resume].
/// 4. The worker wakes up and either pops one value per output or reports termination.
///
/// The number of values supplied on resume must equal the number of outputs the worker
/// requested. A mismatch either leaves stale values in the queue or makes the worker panic
/// on an empty queue.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
///
/// use graph_yield::{Handshake, Resumption};
///
/// let handshake = Arc::new(Handshake::new());
///
/// let worker = thread::spawn({
///     let handshake = Arc::clone(&handshake);
///     move || handshake.suspend([2, 3], 1)
/// });
///
/// handshake.wait_for_suspend();
/// let product: i32 = handshake.drain_yielded().iter().product();
/// handshake.supply_resume_values([product]);
/// handshake.signal_resume();
///
/// assert_eq!(worker.join().unwrap(), Resumption::Resumed(vec![6]));
/// ```
pub struct Handshake<T> {
    events: EventPool,
    queue: MessageQueue<T>,
    terminate: AtomicBool,
    worker_exited: AtomicBool,
}

impl<T> Handshake<T> {
    /// Creates a handshake with both events unsignaled and an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: EventPool::new(),
            queue: MessageQueue::new(),
            terminate: AtomicBool::new(false),
            worker_exited: AtomicBool::new(false),
        }
    }

    /// Yields `inputs` to the orchestrator and blocks until it resumes the worker.
    ///
    /// Returns `output_count` replacement values in the order the orchestrator supplied
    /// them, or [`Resumption::Terminated`] if the orchestrator requested termination, in
    /// which case nothing is taken from the queue.
    ///
    /// # Panics
    ///
    /// Panics if the orchestrator resumed without supplying at least `output_count` values.
    pub fn suspend<I>(&self, inputs: I, output_count: usize) -> Resumption<T>
    where
        I: IntoIterator<Item = T>,
    {
        let mut yielded: usize = 0;

        for value in inputs {
            self.queue.push(value);
            yielded = yielded.wrapping_add(1);
        }

        // Our own latch must be clear before we announce ourselves, otherwise a resume signal
        // could arrive and then be wiped by a late reset, leaving us blocked forever.
        self.events.reset(EventId::WORKER);
        self.events.signal(EventId::MAIN);

        debug!(yielded, output_count, "worker suspended");

        self.events.wait_and_reset(EventId::WORKER);

        // Acquire pairs with the Release in request_termination(); the event lock already
        // orders this but the flag is also read outside the handshake.
        if self.terminate.load(Ordering::Acquire) {
            warn!("worker resumed with the termination flag set; no outputs will be produced");
            return Resumption::Terminated;
        }

        let values = (0..output_count).map(|_| self.queue.pop()).collect();

        debug!(output_count, "worker resumed");

        Resumption::Resumed(values)
    }

    /// Blocks until the worker announces that it has suspended (or exited), consuming the
    /// announcement.
    pub fn wait_for_suspend(&self) {
        self.events.wait_and_reset(EventId::MAIN);
    }

    /// Like [`wait_for_suspend()`][Self::wait_for_suspend] but gives up after `timeout`.
    ///
    /// Returns `true` if the announcement was observed.
    #[must_use]
    pub fn wait_for_suspend_timeout(&self, timeout: Duration) -> bool {
        self.events.wait_and_reset_timeout(EventId::MAIN, timeout)
    }

    /// Takes every value the worker yielded, in the order it yielded them.
    #[must_use]
    pub fn drain_yielded(&self) -> Vec<T> {
        self.queue.drain()
    }

    /// Queues the values the worker will receive as its outputs, in output order.
    pub fn supply_resume_values<I>(&self, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.queue.push_all(values);
    }

    /// Releases the suspended worker.
    pub fn signal_resume(&self) {
        self.events.signal(EventId::WORKER);
    }

    /// Sets the termination flag and releases the suspended worker, which will then return
    /// without taking any values from the queue.
    pub fn signal_terminate_and_resume(&self) {
        self.request_termination();
        self.signal_resume();
    }

    /// Sets the termination flag without releasing the worker.
    pub fn request_termination(&self) {
        // Release ensures the flag is visible to the worker once it observes the resume signal.
        self.terminate.store(true, Ordering::Release);
    }

    /// Whether termination has been requested for the current run.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Records that the worker has finished its run and wakes an orchestrator that may be
    /// waiting for a suspension that is no longer going to happen.
    pub fn mark_worker_exited(&self) {
        self.worker_exited.store(true, Ordering::Release);
        self.events.signal(EventId::MAIN);
    }

    /// Whether the worker has finished its current run.
    #[must_use]
    pub fn has_worker_exited(&self) -> bool {
        self.worker_exited.load(Ordering::Acquire)
    }

    /// Returns the handshake to its initial state before a new worker run.
    ///
    /// Values left in the queue by a run that broke the push/pop contract are discarded.
    pub fn prepare_run(&self) {
        let stale = self.queue.drain();

        if !stale.is_empty() {
            warn!(
                count = stale.len(),
                "discarding values left in the queue by a previous run"
            );
        }

        self.events.reset_all();
        self.terminate.store(false, Ordering::Release);
        self.worker_exited.store(false, Ordering::Release);
    }

    /// Number of values currently waiting in the queue, in either direction.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// The events used by this handshake.
    #[must_use]
    pub fn events(&self) -> &EventPool {
        &self.events
    }
}

impl<T> Default for Handshake<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Handshake<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("events", &self.events)
            .field("queue", &self.queue)
            .field("terminate", &self.terminate)
            .field("worker_exited", &self.worker_exited)
            .finish()
    }
}
