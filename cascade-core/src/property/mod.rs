//! Property primitives.
//!
//! The leaf types the container tree is built from:
//!
//! - [`Descriptor`]: typed, identity-keyed declaration of a property
//! - `Record`: the value cell held by the container that owns a property
//! - `Signal`: observer slots one container registered for one descriptor
//! - [`SlotId`]: identity of a registered callback, doubling as disconnect handle

mod descriptor;
mod record;
mod signal;
mod value;

pub use descriptor::{Descriptor, DescriptorId};
pub use record::RecordState;
pub use signal::SlotId;
pub use value::PropertyValue;

pub(crate) use record::Record;
pub(crate) use signal::{Signal, SignalRef, SlotFn, WeakSignal};
pub(crate) use value::{downcast, AnyValue};
