//! Signal Implementation
//!
//! A Signal is the set of observer callbacks one container registered for one
//! descriptor. The container that called `connect` owns the signal; the record
//! that currently owns the descriptor only keeps a weak reference to it in its
//! connected list, so observers follow the value as ownership moves around the
//! tree.
//!
//! # Slot Identity
//!
//! Every callback lives in a slot keyed by a [`SlotId`]:
//!
//! - Closures get a fresh token on every `connect` call, so connecting the same
//!   closure twice registers it twice.
//! - Bound methods are keyed by (receiver address, method address). Connecting
//!   the same method on the same receiver again rebinds the existing slot, and
//!   in a deduplicated emission pass the slot fires at most once even when it
//!   is reachable from several signals.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::descriptor::DescriptorId;
use super::value::AnyValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SlotKey {
    Token(u64),
    Method { receiver: usize, method: usize },
}

/// Stable identity of a registered callback. Also serves as disconnect handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(SlotKey);

impl SlotId {
    /// Generate a new unique token for a closure registration.
    pub(crate) fn token() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(SlotKey::Token(COUNTER.fetch_add(1, Ordering::Relaxed)))
    }

    /// Identity of a bound method registration.
    pub(crate) fn method(receiver: usize, method: usize) -> Self {
        Self(SlotKey::Method { receiver, method })
    }

    /// Whether this slot was registered as a bound method.
    pub fn is_method(&self) -> bool {
        matches!(self.0, SlotKey::Method { .. })
    }
}

/// Type-erased callback. Receives the value of the record that fired.
pub(crate) type SlotFn = Rc<dyn Fn(&dyn AnyValue)>;

pub(crate) type SignalRef = Rc<RefCell<Signal>>;
pub(crate) type WeakSignal = Weak<RefCell<Signal>>;

/// Observer slots one container registered for one descriptor.
pub(crate) struct Signal {
    descriptor: DescriptorId,
    slots: IndexMap<SlotId, SlotFn>,
}

impl Signal {
    pub(crate) fn new(descriptor: DescriptorId) -> Self {
        Self {
            descriptor,
            slots: IndexMap::new(),
        }
    }

    pub(crate) fn new_ref(descriptor: DescriptorId) -> SignalRef {
        Rc::new(RefCell::new(Self::new(descriptor)))
    }

    /// Register a callback. An existing slot with the same id is rebound in place.
    pub(crate) fn connect(&mut self, slot: SlotId, callback: SlotFn) -> SlotId {
        self.slots.insert(slot, callback);
        slot
    }

    /// Remove a single slot. Returns whether it was present.
    pub(crate) fn disconnect(&mut self, slot: SlotId) -> bool {
        self.slots.shift_remove(&slot).is_some()
    }

    pub(crate) fn disconnect_all(&mut self) {
        self.slots.clear();
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = (SlotId, &SlotFn)> + '_ {
        self.slots.iter().map(|(slot, callback)| (*slot, callback))
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("descriptor", &self.descriptor)
            .field("slot_count", &self.slots.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
