//! Unbounded FIFO used to move values across the thread boundary.

use std::any::type_name;
use std::fmt;

use crossbeam::queue::SegQueue;

/// An unbounded first-in-first-out channel of `T`.
///
/// Pushing never blocks and never fails. Popping never blocks either: the suspension
/// handshake guarantees that every pop is preceded by a matching push, so
/// [`pop()`][Self::pop] treats an empty queue as a programming error. Use
/// [`try_pop()`][Self::try_pop] where emptiness is an expected condition.
///
/// Items are moved in and out, never copied.
///
/// # Example
///
/// ```rust
/// use graph_yield::MessageQueue;
///
/// let queue = MessageQueue::new();
/// queue.push("loss");
/// queue.push("logits");
///
/// assert_eq!(queue.pop(), "loss");
/// assert_eq!(queue.drain(), vec!["logits"]);
/// assert!(queue.is_empty());
/// ```
pub struct MessageQueue<T> {
    items: SegQueue<T>,
}

impl<T> MessageQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: SegQueue::new(),
        }
    }

    /// Appends an item to the tail of the queue.
    pub fn push(&self, item: T) {
        self.items.push(item);
    }

    /// Appends every item, in iteration order.
    pub fn push_all<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.items.push(item);
        }
    }

    /// Removes and returns the item at the head of the queue.
    ///
    /// # Panics
    ///
    /// Panics if the queue is empty. Callers must only pop items whose push they have
    /// synchronized with.
    #[must_use]
    pub fn pop(&self) -> T {
        self.items
            .pop()
            .expect("popped from an empty message queue - every pop must follow a matching push")
    }

    /// Removes and returns the item at the head of the queue, if any.
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        self.items.pop()
    }

    /// Removes every item currently in the queue, in FIFO order.
    #[must_use]
    pub fn drain(&self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.items.len());

        while let Some(item) = self.items.pop() {
            items.push(item);
        }

        items
    }

    /// Number of items currently in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MessageQueue<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("len", &self.items.len())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use static_assertions::assert_impl_all;
    use testing::with_watchdog;

    use super::*;
    use crate::Value;

    assert_impl_all!(MessageQueue<Value>: Send, Sync);

    #[test]
    fn starts_empty() {
        let queue = MessageQueue::<u32>::new();

        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn preserves_fifo_order() {
        let queue = MessageQueue::new();

        queue.push_all([1, 2, 3]);
        queue.push(4);

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.pop(), 1);
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.drain(), vec![3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_of_empty_queue_is_empty() {
        let queue = MessageQueue::<String>::new();

        assert!(queue.drain().is_empty());
    }

    #[test]
    fn moves_values_without_copying() {
        let queue = MessageQueue::new();
        let value = Value::new([0_u8; 64]);
        let addr = value.buffer_addr();

        queue.push(value);

        assert_eq!(queue.pop().buffer_addr(), addr);
    }

    #[test]
    #[should_panic]
    fn pop_on_empty_panics() {
        let queue = MessageQueue::<u32>::new();

        _ = queue.pop();
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn items_cross_threads_in_order() {
        with_watchdog(|| {
            let queue = Arc::new(MessageQueue::new());

            thread::spawn({
                let queue = Arc::clone(&queue);
                move || queue.push_all(0..100)
            })
            .join()
            .unwrap();

            assert_eq!(queue.drain(), (0..100).collect::<Vec<_>>());
        });
    }
}
