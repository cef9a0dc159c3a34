//! Emission Engine
//!
//! Mutations only mark records dirty. An emission pass turns the dirty state of
//! a subtree into observer calls.
//!
//! # Algorithm
//!
//! 1. Walk the subtree in pre-order. At each node, take its dirty list and its
//!    pending removal notices, mark the records clean and snapshot their values.
//! 2. Queue one call per (dirty record, connected signal, slot). In
//!    deduplicated mode the queue is keyed by slot identity: a slot reached
//!    several times keeps its first position and the value that reached it
//!    last.
//! 3. Release every borrow, then run the queued callbacks in order.
//!
//! Anything a callback dirties (including computed refreshes) lands in the
//! dirty lists after they were taken, so it waits for the next pass. That
//! bounds every pass and makes cyclic computed properties settle one step per
//! pass instead of recursing.

use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::node::NodeRef;
use crate::property::{AnyValue, RecordState, Signal, SlotFn, SlotId};

/// How a pass treats a slot reachable from several dirty records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitMode {
    /// Each slot identity fires at most once per pass.
    #[default]
    Deduplicated,

    /// Every (dirty record, connected signal) pair fires in full.
    Duplicated,
}

impl From<bool> for EmitMode {
    /// `true` selects deduplication.
    fn from(dedupe: bool) -> Self {
        if dedupe {
            Self::Deduplicated
        } else {
            Self::Duplicated
        }
    }
}

struct Pending {
    callback: SlotFn,
    value: Rc<dyn AnyValue>,
}

enum Queue {
    Deduplicated(IndexMap<SlotId, Pending>),
    Duplicated(Vec<Pending>),
}

impl Queue {
    fn new(mode: EmitMode) -> Self {
        match mode {
            EmitMode::Deduplicated => Self::Deduplicated(IndexMap::new()),
            EmitMode::Duplicated => Self::Duplicated(Vec::new()),
        }
    }

    fn push_signal(&mut self, signal: &Signal, value: &Rc<dyn AnyValue>) {
        for (slot, callback) in signal.slots() {
            let pending = Pending {
                callback: Rc::clone(callback),
                value: Rc::clone(value),
            };
            match self {
                Self::Deduplicated(queue) => {
                    queue.insert(slot, pending);
                }
                Self::Duplicated(queue) => queue.push(pending),
            }
        }
    }

    fn into_pending(self) -> Vec<Pending> {
        match self {
            Self::Deduplicated(queue) => queue.into_values().collect(),
            Self::Duplicated(queue) => queue,
        }
    }
}

/// Run one emission pass over the subtree rooted at `root`.
///
/// Returns the number of callbacks invoked.
pub(crate) fn emit(root: &NodeRef, mode: EmitMode) -> usize {
    let span = tracing::trace_span!("emit", ?mode);
    let _enter = span.enter();

    let mut queue = Queue::new(mode);
    collect(root, &mut queue);
    let pending = queue.into_pending();

    tracing::trace!(notifications = pending.len(), "dispatching");

    for call in &pending {
        (call.callback)(&*call.value);
    }
    pending.len()
}

fn collect(node: &NodeRef, queue: &mut Queue) {
    let children = {
        let mut node = node.borrow_mut();

        let dirty = std::mem::take(&mut node.dirty);
        for id in dirty {
            let Some(record) = node.records.get_mut(&id) else {
                continue;
            };
            if record.state() != RecordState::Dirty {
                continue;
            }
            record.mark_clean();

            let signals: Vec<_> = record.connected().iter().filter_map(Weak::upgrade).collect();
            if signals.is_empty() {
                continue;
            }
            let value: Rc<dyn AnyValue> = Rc::from(record.value().clone_boxed());
            for signal in &signals {
                queue.push_signal(&signal.borrow(), &value);
            }
        }

        for notice in std::mem::take(&mut node.removed) {
            for signal in notice.signals.iter().filter_map(Weak::upgrade) {
                queue.push_signal(&signal.borrow(), &notice.value);
            }
        }

        node.children.clone()
    };

    for child in &children {
        collect(child, queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use crate::property::{DescriptorId, Record};
    use crate::tree::node::{propagate_owner, Node};

    fn counting(counter: &Rc<Cell<usize>>) -> SlotFn {
        let counter = Rc::clone(counter);
        Rc::new(move |_: &dyn AnyValue| counter.set(counter.get() + 1))
    }

    fn node_with_observed_record(
        id: DescriptorId,
        slots: &[(SlotId, SlotFn)],
    ) -> (NodeRef, crate::property::SignalRef) {
        let node: NodeRef = Rc::new(RefCell::new(Node::default()));
        let signal = Signal::new_ref(id);
        for (slot, callback) in slots {
            signal.borrow_mut().connect(*slot, Rc::clone(callback));
        }

        let mut record = Record::new(Box::new(0_i32));
        record.link(&signal);
        node.borrow_mut().records.insert(id, record);
        node.borrow_mut().signals.insert(id, Rc::clone(&signal));
        propagate_owner(&node, id, Some(&Rc::downgrade(&node)));
        (node, signal)
    }

    #[test]
    fn mode_from_flag() {
        assert_eq!(EmitMode::from(true), EmitMode::Deduplicated);
        assert_eq!(EmitMode::from(false), EmitMode::Duplicated);
        assert_eq!(EmitMode::default(), EmitMode::Deduplicated);
    }

    #[test]
    fn clean_tree_emits_nothing() {
        let count = Rc::new(Cell::new(0));
        let id = DescriptorId::from(200);
        let (node, _signal) = node_with_observed_record(id, &[(SlotId::token(), counting(&count))]);

        assert_eq!(emit(&node, EmitMode::Deduplicated), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn dirty_record_fires_once_then_settles() {
        let count = Rc::new(Cell::new(0));
        let id = DescriptorId::from(201);
        let (node, _signal) = node_with_observed_record(id, &[(SlotId::token(), counting(&count))]);

        node.borrow_mut().store(id, Box::new(4_i32));
        assert_eq!(emit(&node, EmitMode::Deduplicated), 1);
        assert_eq!(emit(&node, EmitMode::Deduplicated), 0);
        assert_eq!(count.get(), 1);
        assert_eq!(node.borrow().records[&id].state(), RecordState::Clean);
    }

    #[test]
    fn shared_slot_deduplicates_across_records() {
        let count = Rc::new(Cell::new(0));
        let callback = counting(&count);
        let slot = SlotId::method(1, 1);

        let first = DescriptorId::from(202);
        let second = DescriptorId::from(203);
        let (node, _first_signal) =
            node_with_observed_record(first, &[(slot, Rc::clone(&callback))]);

        let second_signal = Signal::new_ref(second);
        second_signal.borrow_mut().connect(slot, Rc::clone(&callback));
        let mut record = Record::new(Box::new(0_i32));
        record.link(&second_signal);
        node.borrow_mut().records.insert(second, record);

        node.borrow_mut().store(first, Box::new(1_i32));
        node.borrow_mut().store(second, Box::new(1_i32));
        assert_eq!(emit(&node, EmitMode::Deduplicated), 1);

        node.borrow_mut().store(first, Box::new(2_i32));
        node.borrow_mut().store(second, Box::new(2_i32));
        assert_eq!(emit(&node, EmitMode::Duplicated), 2);
        assert_eq!(count.get(), 3);
    }
}
