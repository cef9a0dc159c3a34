//! Records
//!
//! A record is the authoritative value cell of one descriptor on the container
//! that owns it. It tracks whether the value changed since the last emission
//! pass and which signals have to fire when it did.

use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::signal::{SignalRef, WeakSignal};
use super::value::AnyValue;
use crate::tree::NodeRef;

/// Dirty state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Observers have seen the current value.
    Clean,

    /// The value changed (or was touched) since the last emission pass.
    Dirty,
}

pub(crate) struct Record {
    value: Box<dyn AnyValue>,

    /// Node of the computed property feeding this record, if any.
    computed: Option<NodeRef>,

    state: RecordState,

    /// Signals that fire when this record is emitted. Not owned.
    connected: SmallVec<[WeakSignal; 2]>,
}

impl Record {
    pub(crate) fn new(value: Box<dyn AnyValue>) -> Self {
        Self {
            value,
            computed: None,
            state: RecordState::Clean,
            connected: SmallVec::new(),
        }
    }

    pub(crate) fn value(&self) -> &dyn AnyValue {
        &*self.value
    }

    /// Store `value` if it differs from the current one. Returns whether it changed.
    pub(crate) fn replace(&mut self, value: Box<dyn AnyValue>) -> bool {
        if self.value.eq_value(&*value) {
            return false;
        }
        self.value = value;
        true
    }

    pub(crate) fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    pub(crate) fn computed_node(&self) -> Option<&NodeRef> {
        self.computed.as_ref()
    }

    /// Whether `node` is the computed property currently feeding this record.
    pub(crate) fn is_computed_by(&self, node: &NodeRef) -> bool {
        self.computed
            .as_ref()
            .is_some_and(|computed| Rc::ptr_eq(computed, node))
    }

    /// Attach a computed node, returning the one it replaces.
    pub(crate) fn set_computed(&mut self, node: Option<NodeRef>) -> Option<NodeRef> {
        std::mem::replace(&mut self.computed, node)
    }

    pub(crate) fn take_computed(&mut self) -> Option<NodeRef> {
        self.computed.take()
    }

    pub(crate) fn state(&self) -> RecordState {
        self.state
    }

    /// Mark dirty. Returns `true` on the clean to dirty transition only.
    pub(crate) fn mark_dirty(&mut self) -> bool {
        let was_clean = self.state == RecordState::Clean;
        self.state = RecordState::Dirty;
        was_clean
    }

    pub(crate) fn mark_clean(&mut self) {
        self.state = RecordState::Clean;
    }

    pub(crate) fn connected(&self) -> &[WeakSignal] {
        &self.connected
    }

    /// Add a signal to the connected list unless it is already there.
    pub(crate) fn link(&mut self, signal: &SignalRef) {
        let weak = Rc::downgrade(signal);
        self.link_weak(weak);
    }

    /// Re-home a batch of signals onto this record.
    pub(crate) fn extend_signals<I>(&mut self, signals: I)
    where
        I: IntoIterator<Item = WeakSignal>,
    {
        for signal in signals {
            self.link_weak(signal);
        }
    }

    /// Replace the connected list wholesale.
    pub(crate) fn relink(&mut self, signals: Vec<WeakSignal>) {
        self.connected = signals.into_iter().collect();
    }

    fn link_weak(&mut self, signal: WeakSignal) {
        self.connected.retain(|existing| existing.strong_count() > 0);
        let linked = self
            .connected
            .iter()
            .any(|existing| Weak::ptr_eq(existing, &signal));
        if signal.strong_count() > 0 && !linked {
            self.connected.push(signal);
        }
    }
}
