//! Registry of reusable events addressed by small integer ids.

use std::fmt;
use std::time::Duration;

use tracing::trace;

use crate::Event;

/// Identifies an event within an [`EventPool`].
///
/// The suspension handshake uses exactly two well-known ids: [`EventId::MAIN`] and
/// [`EventId::WORKER`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EventId(usize);

impl EventId {
    /// Signaled by the worker when it has suspended; waited on by the orchestrating thread.
    pub const MAIN: Self = Self(0);

    /// Signaled by the orchestrating thread to resume the worker; waited on by the worker.
    pub const WORKER: Self = Self(1);

    /// Creates an id for a custom event slot.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The slot index of the event within its pool.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EventId {
    #[cfg_attr(test, mutants::skip)] // No API contract for display output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::MAIN => write!(f, "main"),
            Self::WORKER => write!(f, "worker"),
            Self(index) => write!(f, "event-{index}"),
        }
    }
}

/// A fixed set of [`Event`]s addressed by [`EventId`].
///
/// Events are created together with the pool and live as long as it does. They are reused
/// across any number of signal/reset cycles.
///
/// Addressing an event that does not exist in the pool is a programming error and panics.
///
/// # Example
///
/// ```rust
/// use graph_yield::{EventId, EventPool};
///
/// let pool = EventPool::new();
///
/// pool.signal(EventId::MAIN);
/// pool.wait_and_reset(EventId::MAIN);
///
/// assert!(!pool.is_signaled(EventId::MAIN));
/// ```
#[derive(Debug)]
pub struct EventPool {
    events: Box<[Event]>,
}

impl EventPool {
    /// Number of events the suspension handshake needs.
    pub const PROTOCOL_EVENT_COUNT: usize = 2;

    /// Creates a pool holding the two protocol events, both unsignaled.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::PROTOCOL_EVENT_COUNT)
    }

    /// Creates a pool holding `count` unsignaled events, addressed by ids `0..count`.
    #[must_use]
    pub fn with_capacity(count: usize) -> Self {
        Self {
            events: (0..count).map(|_| Event::new()).collect(),
        }
    }

    /// Number of events in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the pool holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Signals the event, releasing every thread waiting on it.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not address an event in this pool.
    pub fn signal(&self, id: EventId) {
        trace!(event = %id, "signal");
        self.event(id).signal();
    }

    /// Blocks until the event is signaled, without clearing the signal.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not address an event in this pool.
    pub fn wait(&self, id: EventId) {
        self.event(id).wait();
    }

    /// Blocks until the event is signaled, then clears the signal before returning.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not address an event in this pool.
    pub fn wait_and_reset(&self, id: EventId) {
        self.event(id).wait_and_reset();
        trace!(event = %id, "consumed signal");
    }

    /// Like [`wait_and_reset()`][Self::wait_and_reset] but gives up after `timeout`.
    ///
    /// Returns `true` if the signal was observed (and cleared).
    ///
    /// # Panics
    ///
    /// Panics if `id` does not address an event in this pool.
    #[must_use]
    pub fn wait_and_reset_timeout(&self, id: EventId, timeout: Duration) -> bool {
        self.event(id).wait_and_reset_timeout(timeout)
    }

    /// Clears the signal of the event unconditionally.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not address an event in this pool.
    pub fn reset(&self, id: EventId) {
        trace!(event = %id, "reset");
        self.event(id).reset();
    }

    /// Clears the signal of every event in the pool.
    pub fn reset_all(&self) {
        for event in &self.events {
            event.reset();
        }
    }

    /// Whether the event is currently signaled.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not address an event in this pool.
    #[must_use]
    pub fn is_signaled(&self, id: EventId) -> bool {
        self.event(id).is_signaled()
    }

    fn event(&self, id: EventId) -> &Event {
        self.events.get(id.index()).unwrap_or_else(|| {
            panic!(
                "event {id} does not exist in a pool of {} events",
                self.events.len()
            )
        })
    }
}

impl Default for EventPool {
    fn default() -> Self {
        Self::new()
    }
}
