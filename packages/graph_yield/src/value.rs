use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// An opaque unit of data flowing through a graph, such as a tensor.
///
/// A `Value` is a shared handle to its storage. Cloning a `Value` produces a second handle to
/// the same storage - the payload is never copied. Moving a `Value` through a
/// [`MessageQueue`][crate::MessageQueue] transfers ownership of the handle.
///
/// # Example
///
/// ```rust
/// use graph_yield::Value;
///
/// let loss = Value::new(0.25_f32);
/// let alias = loss.clone();
///
/// assert!(Value::ptr_eq(&loss, &alias));
/// assert_eq!(alias.downcast_ref::<f32>(), Some(&0.25));
/// ```
#[derive(Clone)]
pub struct Value {
    buffer: Arc<dyn Any + Send + Sync>,
}

impl Value {
    /// Wraps a payload into a new value with its own storage.
    #[must_use]
    pub fn new<T>(payload: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            buffer: Arc::new(payload),
        }
    }

    /// Returns a reference to the payload if it is of type `T`.
    #[must_use]
    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: Any,
    {
        self.buffer.downcast_ref::<T>()
    }

    /// Whether the payload is of type `T`.
    #[must_use]
    pub fn is<T>(&self) -> bool
    where
        T: Any,
    {
        self.buffer.is::<T>()
    }

    /// Whether two values share the same underlying storage.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.buffer, &b.buffer)
    }

    /// The address of the underlying storage, for identity checks and diagnostics.
    #[must_use]
    pub fn buffer_addr(&self) -> usize {
        Arc::as_ptr(&self.buffer).cast::<()>().addr()
    }
}

impl fmt::Debug for Value {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("buffer", &format_args!("{:#x}", self.buffer_addr()))
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Value: Send, Sync, Clone);

    #[test]
    fn clone_aliases_storage() {
        let a = Value::new(vec![1_u8, 2, 3]);
        let b = a.clone();

        assert!(Value::ptr_eq(&a, &b));
        assert_eq!(a.buffer_addr(), b.buffer_addr());
    }

    #[test]
    fn equal_payloads_do_not_alias() {
        let a = Value::new(7_i64);
        let b = Value::new(7_i64);

        assert!(!Value::ptr_eq(&a, &b));
    }

    #[test]
    fn downcast_checks_type() {
        let value = Value::new("grad".to_string());

        assert!(value.is::<String>());
        assert!(!value.is::<f32>());
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("grad"));
        assert!(value.downcast_ref::<f32>().is_none());
    }
}
