//! Type-erased property values.
//!
//! Containers store values of many different types side by side. Storage is a
//! `Box<dyn AnyValue>`; the typed [`Descriptor`](super::Descriptor) API is the
//! only way values get in or out, so the erased side never has to guess.

use std::any::{type_name, Any};

use super::descriptor::DescriptorId;
use crate::error::{report_misuse, PropertyError};

/// Types that can be stored as a property value.
///
/// Equality decides whether a write is a real change (and therefore whether
/// observers get notified).
pub trait PropertyValue: Clone + PartialEq + 'static {}

impl<T: Clone + PartialEq + 'static> PropertyValue for T {}

/// Object-safe view of a [`PropertyValue`].
pub(crate) trait AnyValue: Any {
    fn as_any(&self) -> &dyn Any;

    fn clone_boxed(&self) -> Box<dyn AnyValue>;

    /// Equality across the erasure boundary. Values of different types are never equal.
    fn eq_value(&self, other: &dyn AnyValue) -> bool;

    fn value_type_name(&self) -> &'static str;
}

impl<T: PropertyValue> AnyValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn AnyValue> {
        Box::new(self.clone())
    }

    fn eq_value(&self, other: &dyn AnyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn value_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// Checked cast from erased storage to the descriptor's type.
///
/// A mismatch is a programmer error: it asserts in debug builds and reads as
/// "no value" in release builds.
pub(crate) fn downcast<T: PropertyValue>(
    value: &dyn AnyValue,
    descriptor: DescriptorId,
) -> Option<&T> {
    let typed = value.as_any().downcast_ref::<T>();
    if typed.is_none() {
        report_misuse(&PropertyError::TypeMismatch {
            descriptor,
            expected: type_name::<T>(),
            found: value.value_type_name(),
        });
    }
    typed
}
