//! Property Descriptors
//!
//! A descriptor is the key of a property. It declares the value type, the
//! default value returned when no container in the ancestor chain owns the
//! property, and an optional human readable name.
//!
//! # Identity
//!
//! Descriptors are compared by identity, not by value. Two descriptors created
//! with the same default are two different properties. Every descriptor gets a
//! process-unique [`DescriptorId`] when it is created, and containers key all
//! of their bookkeeping by that id.
//!
//! Cloning a descriptor yields another handle to the *same* property. The
//! default value and name live behind a shared pointer, so containers never
//! borrow from a descriptor and a descriptor does not have to outlive the
//! containers that used it.
//!
//! ```rust,ignore
//! use std::sync::LazyLock;
//!
//! static WIDTH: LazyLock<Descriptor<u32>> = LazyLock::new(|| Descriptor::named("width", 80));
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::value::PropertyValue;

/// Process-unique identity of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(u64);

impl DescriptorId {
    /// Generate a new unique descriptor ID.
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
impl From<u64> for DescriptorId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct DescriptorInner<T> {
    id: DescriptorId,
    default: T,
    name: Option<Cow<'static, str>>,
}

/// Typed key of a property.
///
/// # Type Parameters
///
/// - `T`: The value type. Any `Clone + PartialEq + 'static` type works.
pub struct Descriptor<T: PropertyValue> {
    inner: Arc<DescriptorInner<T>>,
}

impl<T: PropertyValue> Descriptor<T> {
    /// Create an anonymous descriptor with the given default value.
    pub fn new(default: T) -> Self {
        Self {
            inner: Arc::new(DescriptorInner {
                id: DescriptorId::next(),
                default,
                name: None,
            }),
        }
    }

    /// Create a named descriptor. The name only shows up in debug output.
    pub fn named(name: impl Into<Cow<'static, str>>, default: T) -> Self {
        Self {
            inner: Arc::new(DescriptorInner {
                id: DescriptorId::next(),
                default,
                name: Some(name.into()),
            }),
        }
    }

    /// The descriptor's identity.
    pub fn id(&self) -> DescriptorId {
        self.inner.id
    }

    /// Value returned when nothing in the ancestor chain owns this property.
    pub fn default_value(&self) -> &T {
        &self.inner.default
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }
}

impl<T: PropertyValue> Clone for Descriptor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: PropertyValue> PartialEq for Descriptor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T: PropertyValue> Eq for Descriptor<T> {}

impl<T> fmt::Debug for Descriptor<T>
where
    T: PropertyValue + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("default", &self.inner.default)
            .finish()
    }
}
