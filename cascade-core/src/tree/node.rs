//! Tree Nodes
//!
//! The shared state behind a [`Container`](super::Container) handle, plus the
//! walks that keep the visibility index and the connected-signal lists
//! consistent while ownership moves around the tree.
//!
//! # Visibility Index
//!
//! Every node maps each descriptor it can see to the node that owns it: itself
//! when it holds a record, otherwise the nearest ancestor that does. Entries
//! are weak so the index never keeps a node alive.
//!
//! Ownership changes only ever touch the "uncovered" part of a subtree: a walk
//! stops at any descendant that owns the descriptor itself, because everything
//! below that descendant resolves to it regardless of what happens above.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::computed::ComputedState;
use crate::property::{AnyValue, DescriptorId, Record, SignalRef, WeakSignal};

pub(crate) type NodeRef = Rc<RefCell<Node>>;
pub(crate) type WeakNode = Weak<RefCell<Node>>;

/// Pending "reverted to default" notification for observers orphaned by a removal.
pub(crate) struct RemovedNotice {
    pub(crate) descriptor: DescriptorId,
    pub(crate) value: Rc<dyn AnyValue>,
    pub(crate) signals: Vec<WeakSignal>,
}

#[derive(Default)]
pub(crate) struct Node {
    pub(crate) parent: WeakNode,

    /// Owned subtrees, including the nodes of computed properties.
    pub(crate) children: Vec<NodeRef>,

    /// Properties set on exactly this node.
    pub(crate) records: IndexMap<DescriptorId, Record>,

    /// Observers registered on this node, one signal per descriptor.
    pub(crate) signals: IndexMap<DescriptorId, SignalRef>,

    /// Descriptor to owning node, for every descriptor visible from here.
    pub(crate) visibility: IndexMap<DescriptorId, WeakNode>,

    /// Records that went dirty since the last emission pass, in order.
    pub(crate) dirty: Vec<DescriptorId>,

    pub(crate) removed: Vec<RemovedNotice>,

    /// Set when this node is the hidden child backing a computed property.
    pub(crate) computed: Option<ComputedState>,
}

impl Node {
    pub(crate) fn owns(&self, id: DescriptorId) -> bool {
        self.records.contains_key(&id)
    }

    pub(crate) fn is_computed_node(&self) -> bool {
        self.computed.is_some()
    }

    /// Mark a record dirty, queueing it on the clean to dirty transition.
    pub(crate) fn mark_dirty(&mut self, id: DescriptorId) {
        if let Some(record) = self.records.get_mut(&id) {
            if record.mark_dirty() {
                self.dirty.push(id);
            }
        }
    }

    /// Store a value into an owned record. Marks dirty only on an actual change.
    pub(crate) fn store(&mut self, id: DescriptorId, value: Box<dyn AnyValue>) -> bool {
        let changed = self
            .records
            .get_mut(&id)
            .is_some_and(|record| record.replace(value));
        if changed {
            self.mark_dirty(id);
        }
        changed
    }
}

/// Node currently owning `id` as seen from `node`.
pub(crate) fn owner_of(node: &NodeRef, id: DescriptorId) -> Option<NodeRef> {
    node.borrow().visibility.get(&id).and_then(Weak::upgrade)
}

/// Point `id` at `owner` (or erase it) on `node` and on every descendant that
/// does not own `id` itself.
pub(crate) fn propagate_owner(node: &NodeRef, id: DescriptorId, owner: Option<&WeakNode>) {
    let children = {
        let mut node = node.borrow_mut();
        match owner {
            Some(owner) => {
                node.visibility.insert(id, owner.clone());
            }
            None => {
                node.visibility.shift_remove(&id);
            }
        }
        node.children.clone()
    };

    for child in &children {
        let covered = child.borrow().owns(id);
        if !covered {
            propagate_owner(child, id, owner);
        }
    }
}

/// Gather the signals for `id` registered on `node` and on every descendant
/// that resolves `id` through `node`.
pub(crate) fn collect_signals(node: &NodeRef, id: DescriptorId, out: &mut Vec<WeakSignal>) {
    let children = {
        let node = node.borrow();
        if let Some(signal) = node.signals.get(&id) {
            out.push(Rc::downgrade(signal));
        }
        node.children.clone()
    };

    for child in &children {
        let covered = child.borrow().owns(id);
        if !covered {
            collect_signals(child, id, out);
        }
    }
}

/// Drop `signals` from pending removal notices for `id`. The notices that can
/// hold them sit on the ancestors of `node` and in its uncovered subtree.
///
/// Returns whether any notice lost a signal.
pub(crate) fn purge_notices(node: &NodeRef, id: DescriptorId, signals: &[WeakSignal]) -> bool {
    if signals.is_empty() {
        return false;
    }

    let mut purged = false;
    let mut current = node.borrow().parent.upgrade();
    while let Some(ancestor) = current {
        purged |= purge_local(&ancestor, id, signals);
        current = ancestor.borrow().parent.upgrade();
    }
    purge_below(node, id, signals) || purged
}

fn purge_below(node: &NodeRef, id: DescriptorId, signals: &[WeakSignal]) -> bool {
    let mut purged = purge_local(node, id, signals);
    let children = node.borrow().children.clone();
    for child in &children {
        let covered = child.borrow().owns(id);
        if !covered {
            purged |= purge_below(child, id, signals);
        }
    }
    purged
}

fn purge_local(node: &NodeRef, id: DescriptorId, signals: &[WeakSignal]) -> bool {
    let mut node = node.borrow_mut();
    if node.removed.is_empty() {
        return false;
    }

    let mut purged = false;
    for notice in node.removed.iter_mut().filter(|notice| notice.descriptor == id) {
        let before = notice.signals.len();
        notice
            .signals
            .retain(|signal| !signals.iter().any(|other| Weak::ptr_eq(signal, other)));
        purged |= notice.signals.len() != before;
    }
    node.removed.retain(|notice| !notice.signals.is_empty());
    purged
}

/// Rebuild the connected list of the record `node` owns for `id`.
pub(crate) fn relink_signals(node: &NodeRef, id: DescriptorId) {
    let mut signals = Vec::new();
    collect_signals(node, id, &mut signals);
    if let Some(record) = node.borrow_mut().records.get_mut(&id) {
        record.relink(signals);
    }
}

/// Whether `candidate` is `node` or one of its ancestors.
pub(crate) fn is_self_or_ancestor(node: &NodeRef, candidate: &NodeRef) -> bool {
    let mut current = Some(Rc::clone(node));
    while let Some(step) = current {
        if Rc::ptr_eq(&step, candidate) {
            return true;
        }
        current = step.borrow().parent.upgrade();
    }
    false
}

/// Hang `child` below `parent` and let it see everything `parent` sees.
///
/// The child keeps the descriptors it owns. Signals already registered inside
/// the child's subtree are linked to the records that now serve them, and
/// those records are marked dirty so the signals hear the inherited value.
pub(crate) fn attach(parent: &NodeRef, child: &NodeRef) {
    let stale: Vec<DescriptorId> = {
        let child = child.borrow();
        child
            .visibility
            .keys()
            .copied()
            .filter(|id| !child.owns(*id))
            .collect()
    };
    for id in stale {
        propagate_owner(child, id, None);
    }

    child.borrow_mut().parent = Rc::downgrade(parent);
    parent.borrow_mut().children.push(Rc::clone(child));

    let inherited: Vec<(DescriptorId, WeakNode)> = parent
        .borrow()
        .visibility
        .iter()
        .map(|(id, owner)| (*id, owner.clone()))
        .collect();

    for (id, owner) in inherited {
        let covered = child.borrow().owns(id);
        if covered {
            continue;
        }
        propagate_owner(child, id, Some(&owner));

        let Some(owner) = owner.upgrade() else {
            continue;
        };
        let mut signals = Vec::new();
        collect_signals(child, id, &mut signals);
        if signals.is_empty() {
            continue;
        }
        {
            let mut owner = owner.borrow_mut();
            let Some(record) = owner.records.get_mut(&id) else {
                continue;
            };
            record.extend_signals(signals.iter().cloned());
        }

        // These observers last saw a value from inside the detached subtree
        // (or have a "reverted to default" notice pending there). The
        // inherited value replaces both.
        purge_notices(child, id, &signals);
        owner.borrow_mut().mark_dirty(id);
    }
}

/// Drop `node` from the children of `parent`.
pub(crate) fn detach_child(parent: &NodeRef, node: &NodeRef) {
    parent
        .borrow_mut()
        .children
        .retain(|child| !Rc::ptr_eq(child, node));
}
