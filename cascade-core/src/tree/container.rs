//! Containers
//!
//! A [`Container`] is a node of the property tree. It holds the properties set
//! on it, owns its child containers, and resolves every other property through
//! its ancestors: a descendant that did not set a property sees the value of
//! the nearest ancestor that did, or the descriptor's default.
//!
//! # Handles
//!
//! `Container` is a cheap handle around shared node state. Cloning it yields a
//! second handle to the *same* node; [`Container::deep_clone`] copies a
//! subtree. A parent keeps its children alive, while a child only refers back
//! to its parent weakly, so dropping the last handle to a root tears the whole
//! tree down. Use [`WeakContainer`] inside callbacks that need to reach back
//! into the tree.
//!
//! # Notifications
//!
//! Mutations never call observers directly. They mark records dirty, and an
//! explicit [`Container::emit`] pass notifies observers of everything that
//! changed since the previous pass.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::computed::{refresh, Computed, ComputedState};
use super::emit::{self, EmitMode};
use super::node::{
    attach, detach_child, is_self_or_ancestor, owner_of, propagate_owner, purge_notices,
    relink_signals, Node, NodeRef, RemovedNotice, WeakNode,
};
use crate::error::{report_misuse, PropertyError, PropertyResult};
use crate::property::{
    downcast, AnyValue, Descriptor, DescriptorId, PropertyValue, Record, RecordState, Signal,
    SlotFn, SlotId, WeakSignal,
};

/// A node of the property tree.
///
/// # Example
///
/// ```rust
/// use cascade_core::{Container, Descriptor};
///
/// let width = Descriptor::named("width", 80_u32);
///
/// let root = Container::new();
/// let panel = root.add_child_container();
///
/// assert_eq!(panel.get_property(&width), 80);
///
/// root.set_property(&width, 120);
/// assert_eq!(panel.get_property(&width), 120);
///
/// panel.set_property(&width, 40);
/// assert_eq!(root.get_property(&width), 120);
/// assert_eq!(panel.get_property(&width), 40);
/// ```
#[derive(Clone)]
pub struct Container {
    node: NodeRef,
}

/// Non-owning handle to a [`Container`].
#[derive(Clone, Default)]
pub struct WeakContainer {
    node: WeakNode,
}

impl WeakContainer {
    /// Get the container back, if it is still alive.
    pub fn upgrade(&self) -> Option<Container> {
        self.node.upgrade().map(Container::from_node)
    }
}

impl fmt::Debug for WeakContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakContainer")
            .field("alive", &(self.node.strong_count() > 0))
            .finish()
    }
}

impl Container {
    /// Create a detached, empty container.
    pub fn new() -> Self {
        Self::from_node(Rc::new(RefCell::new(Node::default())))
    }

    pub(crate) fn from_node(node: NodeRef) -> Self {
        Self { node }
    }

    #[cfg(test)]
    pub(crate) fn node(&self) -> &NodeRef {
        &self.node
    }

    // ------------------------------------------------------------------------
    // Tree structure
    // ------------------------------------------------------------------------

    /// Attach `child` as an owned subtree.
    ///
    /// Attaching a container that already has a parent, or one of this
    /// container's own ancestors, is reported as misuse and ignored.
    pub fn add_child(&self, child: &Container) {
        if let Err(err) = self.try_add_child(child) {
            report_misuse(&err);
        }
    }

    /// Attach `child` as an owned subtree.
    ///
    /// The child inherits every property visible here, except the ones it set
    /// itself. Observers already connected inside the child's subtree start
    /// following the inherited values and are notified of them in the next
    /// emission pass.
    pub fn try_add_child(&self, child: &Container) -> PropertyResult<()> {
        if child.node.borrow().parent.upgrade().is_some() {
            return Err(PropertyError::AlreadyAttached);
        }
        if is_self_or_ancestor(&self.node, &child.node) {
            return Err(PropertyError::CyclicAttachment);
        }
        attach(&self.node, &child.node);
        Ok(())
    }

    /// Create a new empty child and return a handle to it.
    pub fn add_child_container(&self) -> Container {
        let child = Container::new();
        attach(&self.node, &child.node);
        child
    }

    pub fn parent(&self) -> Option<Container> {
        self.node.borrow().parent.upgrade().map(Container::from_node)
    }

    /// Child containers in insertion order. Nodes backing computed properties
    /// are not listed.
    pub fn children(&self) -> Vec<Container> {
        self.node
            .borrow()
            .children
            .iter()
            .filter(|child| !child.borrow().is_computed_node())
            .cloned()
            .map(Container::from_node)
            .collect()
    }

    pub fn child_count(&self) -> usize {
        self.node
            .borrow()
            .children
            .iter()
            .filter(|child| !child.borrow().is_computed_node())
            .count()
    }

    /// Whether both handles point to the same node.
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer {
            node: Rc::downgrade(&self.node),
        }
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Set a property on this container, making it the owner.
    ///
    /// Descendants that did not set the property themselves see the new
    /// value. Observers are scheduled only if the effective value changed.
    ///
    /// Overwriting a computed property is reported as misuse; release builds
    /// replace the computed property with the plain value.
    pub fn set_property<T: PropertyValue>(&self, descriptor: &Descriptor<T>, value: T) {
        let id = descriptor.id();
        if self.owns_computed(id) {
            report_misuse(&PropertyError::OwnershipConflict { descriptor: id });
            self.drop_computed(id);
        }
        self.assign(id, Box::new(value), || boxed_default(descriptor));
    }

    /// Like [`set_property`](Self::set_property), but refuses to overwrite a
    /// computed property.
    pub fn try_set_property<T: PropertyValue>(
        &self,
        descriptor: &Descriptor<T>,
        value: T,
    ) -> PropertyResult<()> {
        let id = descriptor.id();
        if self.owns_computed(id) {
            return Err(PropertyError::OwnershipConflict { descriptor: id });
        }
        self.assign(id, Box::new(value), || boxed_default(descriptor));
        Ok(())
    }

    /// Change the value at whichever container currently owns the property.
    ///
    /// Never creates ownership; a no-op when nothing in the ancestor chain
    /// set the property. Changing a computed property is reported as misuse
    /// and ignored.
    pub fn change_property<T: PropertyValue>(&self, descriptor: &Descriptor<T>, value: T) {
        if let Err(err) = self.try_change_property(descriptor, value) {
            report_misuse(&err);
        }
    }

    pub fn try_change_property<T: PropertyValue>(
        &self,
        descriptor: &Descriptor<T>,
        value: T,
    ) -> PropertyResult<()> {
        let id = descriptor.id();
        let Some(owner) = owner_of(&self.node, id) else {
            return Ok(());
        };
        let mut owner = owner.borrow_mut();
        match owner.records.get(&id) {
            None => return Ok(()),
            Some(record) if record.is_computed() => {
                return Err(PropertyError::ComputedMutation { descriptor: id });
            }
            Some(_) => {}
        }
        owner.store(id, Box::new(value));
        Ok(())
    }

    /// Effective value: the owner's value, or the descriptor's default.
    pub fn get_property<T: PropertyValue>(&self, descriptor: &Descriptor<T>) -> T {
        let id = descriptor.id();
        if let Some(owner) = owner_of(&self.node, id) {
            let owner = owner.borrow();
            let value = owner
                .records
                .get(&id)
                .and_then(|record| downcast::<T>(record.value(), id));
            if let Some(value) = value {
                return value.clone();
            }
        }
        descriptor.default_value().clone()
    }

    /// Whether this container or one of its ancestors set the property.
    pub fn has_property<T: PropertyValue>(&self, descriptor: &Descriptor<T>) -> bool {
        owner_of(&self.node, descriptor.id()).is_some()
    }

    /// Whether the property was set on exactly this container.
    pub fn owns_property<T: PropertyValue>(&self, descriptor: &Descriptor<T>) -> bool {
        self.node.borrow().owns(descriptor.id())
    }

    /// Whether the property on this container is computed.
    pub fn is_computed<T: PropertyValue>(&self, descriptor: &Descriptor<T>) -> bool {
        self.owns_computed(descriptor.id())
    }

    /// Dirty state of the record owning the property, as seen from here.
    pub fn property_state<T: PropertyValue>(
        &self,
        descriptor: &Descriptor<T>,
    ) -> Option<RecordState> {
        let id = descriptor.id();
        let owner = owner_of(&self.node, id)?;
        let owner = owner.borrow();
        owner.records.get(&id).map(Record::state)
    }

    /// Schedule a notification for the owning record without changing it.
    pub fn touch_property<T: PropertyValue>(&self, descriptor: &Descriptor<T>) {
        let id = descriptor.id();
        if let Some(owner) = owner_of(&self.node, id) {
            owner.borrow_mut().mark_dirty(id);
        }
    }

    /// Remove the property from this container.
    ///
    /// Only effective if this container set the property. Descendants fall back
    /// to the nearest remaining ancestor, and observers move along with them.
    /// When nothing else owns the property, observers get one final
    /// notification carrying the default value (if it differs from the
    /// removed value).
    pub fn remove_property<T: PropertyValue>(&self, descriptor: &Descriptor<T>) {
        let id = descriptor.id();
        let Some((old_value, was_dirty, signals)) = self.release(id) else {
            return;
        };

        match self.parent_owner(id) {
            Some(owner) => {
                relink_signals(&owner, id);
                let mut owner = owner.borrow_mut();
                let differs = owner
                    .records
                    .get(&id)
                    .is_some_and(|record| !record.value().eq_value(&*old_value));
                if differs || was_dirty {
                    tracing::debug!(descriptor = %id, "removed property falls back to an ancestor");
                    owner.mark_dirty(id);
                }
            }
            None => {
                let default = boxed_default(descriptor);
                let signals: Vec<_> = signals
                    .into_iter()
                    .filter(|signal| signal.strong_count() > 0)
                    .collect();
                if signals.is_empty() || (!was_dirty && default.eq_value(&*old_value)) {
                    return;
                }
                tracing::debug!(
                    descriptor = %id,
                    observers = signals.len(),
                    "removed property reverts to default"
                );
                self.node.borrow_mut().removed.push(RemovedNotice {
                    descriptor: id,
                    value: Rc::from(default),
                    signals,
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Computed properties
    // ------------------------------------------------------------------------

    /// Install a computed property on this container.
    ///
    /// Replacing a plain value set here is reported as misuse; release builds
    /// replace it. Remove the plain value first to swap it out cleanly.
    /// Replacing another computed property is allowed.
    pub fn set_computed<T: PropertyValue>(
        &self,
        descriptor: &Descriptor<T>,
        computed: Computed<T>,
    ) {
        let id = descriptor.id();
        if self.owns_plain(id) {
            report_misuse(&PropertyError::OwnershipConflict { descriptor: id });
        }
        self.install_computed(computed.into_state(id), Some(boxed_default(descriptor)));
    }

    /// Like [`set_computed`](Self::set_computed), but refuses to replace a
    /// plain value set on this container.
    pub fn try_set_computed<T: PropertyValue>(
        &self,
        descriptor: &Descriptor<T>,
        computed: Computed<T>,
    ) -> PropertyResult<()> {
        let id = descriptor.id();
        if self.owns_plain(id) {
            return Err(PropertyError::OwnershipConflict { descriptor: id });
        }
        self.install_computed(computed.into_state(id), Some(boxed_default(descriptor)));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    /// Call `callback` with the new value whenever the property as seen from
    /// this container changes.
    ///
    /// Every call registers a new slot, even for the same closure.
    pub fn connect<T, F>(&self, descriptor: &Descriptor<T>, callback: F) -> SlotId
    where
        T: PropertyValue,
        F: Fn(&T) + 'static,
    {
        let id = descriptor.id();
        self.connect_slot(
            id,
            SlotId::token(),
            Rc::new(move |value: &dyn AnyValue| {
                if let Some(value) = downcast::<T>(value, id) {
                    callback(value);
                }
            }),
        )
    }

    /// Call `callback` whenever the property as seen from this container changes.
    pub fn connect_notify<T, F>(&self, descriptor: &Descriptor<T>, callback: F) -> SlotId
    where
        T: PropertyValue,
        F: Fn() + 'static,
    {
        self.connect_slot(
            descriptor.id(),
            SlotId::token(),
            Rc::new(move |_: &dyn AnyValue| callback()),
        )
    }

    /// Call `method` on `receiver` with the new value.
    ///
    /// The slot is identified by (receiver, method): connecting the same pair
    /// again rebinds the slot, and an emission pass calls it at most once. The
    /// receiver is held weakly.
    pub fn connect_method<T, R>(
        &self,
        descriptor: &Descriptor<T>,
        receiver: &Rc<RefCell<R>>,
        method: fn(&mut R, &T),
    ) -> SlotId
    where
        T: PropertyValue,
        R: 'static,
    {
        let id = descriptor.id();
        let slot = SlotId::method(receiver_address(receiver), method as usize);
        let receiver = Rc::downgrade(receiver);
        self.connect_slot(
            id,
            slot,
            Rc::new(move |value: &dyn AnyValue| {
                let Some(receiver) = receiver.upgrade() else {
                    return;
                };
                if let Some(value) = downcast::<T>(value, id) {
                    method(&mut receiver.borrow_mut(), value);
                }
            }),
        )
    }

    /// Zero-argument form of [`connect_method`](Self::connect_method).
    pub fn connect_method_notify<T, R>(
        &self,
        descriptor: &Descriptor<T>,
        receiver: &Rc<RefCell<R>>,
        method: fn(&mut R),
    ) -> SlotId
    where
        T: PropertyValue,
        R: 'static,
    {
        let slot = SlotId::method(receiver_address(receiver), method as usize);
        let receiver: Weak<RefCell<R>> = Rc::downgrade(receiver);
        self.connect_slot(
            descriptor.id(),
            slot,
            Rc::new(move |_: &dyn AnyValue| {
                if let Some(receiver) = receiver.upgrade() {
                    method(&mut receiver.borrow_mut());
                }
            }),
        )
    }

    /// Remove one slot registered on this container. Returns whether it existed.
    pub fn disconnect<T: PropertyValue>(&self, descriptor: &Descriptor<T>, slot: SlotId) -> bool {
        let signal = self.node.borrow().signals.get(&descriptor.id()).cloned();
        signal.is_some_and(|signal| signal.borrow_mut().disconnect(slot))
    }

    /// Remove every slot registered on this container for the property.
    pub fn disconnect_all<T: PropertyValue>(&self, descriptor: &Descriptor<T>) {
        let signal = self.node.borrow().signals.get(&descriptor.id()).cloned();
        if let Some(signal) = signal {
            signal.borrow_mut().disconnect_all();
        }
    }

    // ------------------------------------------------------------------------
    // Emission and copies
    // ------------------------------------------------------------------------

    /// Notify observers of everything that changed in this subtree since the
    /// previous pass, calling each slot at most once.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self) -> usize {
        emit::emit(&self.node, EmitMode::Deduplicated)
    }

    pub fn emit_with(&self, mode: EmitMode) -> usize {
        emit::emit(&self.node, mode)
    }

    /// Copy this subtree into a new detached tree.
    ///
    /// Values inherited from above this container become values set on the
    /// copy's root. Computed properties are re-created and recompute from the
    /// copy. Observers are not copied.
    pub fn deep_clone(&self) -> Container {
        let copy = Container::new();

        let inherited: Vec<DescriptorId> = {
            let node = self.node.borrow();
            node.visibility
                .keys()
                .copied()
                .filter(|id| !node.owns(*id))
                .collect()
        };
        for id in inherited {
            if let Some(value) = self.visible_value(id) {
                copy.insert_value(id, value);
            }
        }

        copy_into(&self.node, &copy);
        copy
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn owns_computed(&self, id: DescriptorId) -> bool {
        self.node
            .borrow()
            .records
            .get(&id)
            .is_some_and(Record::is_computed)
    }

    fn owns_plain(&self, id: DescriptorId) -> bool {
        self.node
            .borrow()
            .records
            .get(&id)
            .is_some_and(|record| !record.is_computed())
    }

    fn parent_owner(&self, id: DescriptorId) -> Option<NodeRef> {
        let parent = self.node.borrow().parent.upgrade()?;
        owner_of(&parent, id)
    }

    /// Copy of the effective value, if anything owns `id`.
    fn visible_value(&self, id: DescriptorId) -> Option<Box<dyn AnyValue>> {
        let owner = owner_of(&self.node, id)?;
        let owner = owner.borrow();
        owner.records.get(&id).map(|record| record.value().clone_boxed())
    }

    /// Make this container own `id` with `record`, re-pointing the uncovered
    /// part of the subtree and moving the observers that now resolve here.
    fn take_ownership(&self, id: DescriptorId, record: Record) {
        let previous_owner = owner_of(&self.node, id);
        let previous_dirty = previous_owner.as_ref().is_some_and(|owner| {
            owner
                .borrow()
                .records
                .get(&id)
                .is_some_and(|record| record.state() == RecordState::Dirty)
        });

        self.node.borrow_mut().records.insert(id, record);
        propagate_owner(&self.node, id, Some(&Rc::downgrade(&self.node)));

        relink_signals(&self.node, id);
        if let Some(owner) = previous_owner {
            relink_signals(&owner, id);
        }

        // Observers moving here either had a change pending on the previous
        // owner or a pending "reverted to default" notice; both are now this
        // record's to deliver.
        let signals = self
            .node
            .borrow()
            .records
            .get(&id)
            .map(|record| record.connected().to_vec())
            .unwrap_or_default();
        let superseded = purge_notices(&self.node, id, &signals);
        if previous_dirty || superseded {
            self.node.borrow_mut().mark_dirty(id);
        }
    }

    fn assign<F>(&self, id: DescriptorId, value: Box<dyn AnyValue>, fallback: F)
    where
        F: FnOnce() -> Box<dyn AnyValue>,
    {
        let owned = self.node.borrow().owns(id);
        if !owned {
            let previous = self.visible_value(id).unwrap_or_else(fallback);
            self.take_ownership(id, Record::new(previous));
        }
        self.node.borrow_mut().store(id, value);
    }

    /// Own `id` with `value` as is, without scheduling a notification.
    fn insert_value(&self, id: DescriptorId, value: Box<dyn AnyValue>) {
        let owned = self.node.borrow().owns(id);
        if owned {
            self.node.borrow_mut().store(id, value);
        } else {
            self.take_ownership(id, Record::new(value));
        }
    }

    /// Detach the record for `id` and restore inherited visibility below this
    /// container. Returns the removed value, whether it was waiting for a
    /// pass, and the signals it served.
    fn release(&self, id: DescriptorId) -> Option<(Box<dyn AnyValue>, bool, Vec<WeakSignal>)> {
        let mut record = {
            let mut node = self.node.borrow_mut();
            let record = node.records.shift_remove(&id)?;
            node.dirty.retain(|dirty| *dirty != id);
            record
        };

        let fallback = self.parent_owner(id).map(|owner| Rc::downgrade(&owner));
        propagate_owner(&self.node, id, fallback.as_ref());

        let was_dirty = record.state() == RecordState::Dirty;
        let signals = record.connected().to_vec();
        if let Some(computed) = record.take_computed() {
            detach_child(&self.node, &computed);
        }
        Some((record.value().clone_boxed(), was_dirty, signals))
    }

    /// Replace the computed property on `id` with a plain record holding the
    /// same value. Observers stay linked.
    fn drop_computed(&self, id: DescriptorId) {
        let computed = self
            .node
            .borrow_mut()
            .records
            .get_mut(&id)
            .and_then(Record::take_computed);
        if let Some(computed) = computed {
            detach_child(&self.node, &computed);
        }
    }

    fn install_computed(&self, state: ComputedState, fallback: Option<Box<dyn AnyValue>>) {
        let id = state.descriptor;
        let inputs = state.inputs.clone();

        let hidden = Container::new();
        hidden.node.borrow_mut().computed = Some(state.clone());
        attach(&self.node, &hidden.node);

        // One slot for all inputs, so a deduplicated pass refreshes once.
        let slot = SlotId::token();
        let weak = Rc::downgrade(&hidden.node);
        let on_input: SlotFn = Rc::new(move |_: &dyn AnyValue| {
            if let Some(node) = weak.upgrade() {
                refresh(&node);
            }
        });
        for input in inputs {
            hidden.connect_slot(input, slot, Rc::clone(&on_input));
        }

        let value = state.evaluate(&hidden);

        let replaced = self
            .node
            .borrow_mut()
            .records
            .get_mut(&id)
            .map(|record| record.set_computed(Some(Rc::clone(&hidden.node))));

        match replaced {
            Some(previous) => {
                if let Some(previous) = previous {
                    detach_child(&self.node, &previous);
                }
            }
            None => {
                let initial = self
                    .visible_value(id)
                    .or(fallback)
                    .unwrap_or_else(|| value.clone_boxed());
                let mut record = Record::new(initial);
                record.set_computed(Some(Rc::clone(&hidden.node)));
                self.take_ownership(id, record);
            }
        }

        self.node.borrow_mut().store(id, value);
    }

    fn connect_slot(&self, id: DescriptorId, slot: SlotId, callback: SlotFn) -> SlotId {
        let signal = {
            let mut node = self.node.borrow_mut();
            Rc::clone(node.signals.entry(id).or_insert_with(|| Signal::new_ref(id)))
        };
        signal.borrow_mut().connect(slot, callback);

        if let Some(owner) = owner_of(&self.node, id) {
            if let Some(record) = owner.borrow_mut().records.get_mut(&id) {
                record.link(&signal);
            }
        }
        slot
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node.borrow();
        f.debug_struct("Container")
            .field("owned", &node.records.keys().collect::<Vec<_>>())
            .field("visible", &node.visibility.len())
            .field("children", &node.children.len())
            .field("computed", &node.is_computed_node())
            .finish()
    }
}

fn boxed_default<T: PropertyValue>(descriptor: &Descriptor<T>) -> Box<dyn AnyValue> {
    Box::new(descriptor.default_value().clone())
}

fn receiver_address<R>(receiver: &Rc<RefCell<R>>) -> usize {
    Rc::as_ptr(receiver).cast::<()>() as usize
}

/// Copy the properties and children of `source` into `target`.
///
/// Computed properties are installed before the children are copied so that
/// copied descendants evaluate against them.
fn copy_into(source: &NodeRef, target: &Container) {
    let mut values = Vec::new();
    let mut computed = Vec::new();
    let children: Vec<NodeRef> = {
        let source = source.borrow();
        for (id, record) in &source.records {
            match record.computed_node() {
                Some(node) => {
                    if let Some(state) = node.borrow().computed.clone() {
                        computed.push(state);
                    }
                }
                None => values.push((*id, record.value().clone_boxed())),
            }
        }
        source
            .children
            .iter()
            .filter(|child| !child.borrow().is_computed_node())
            .cloned()
            .collect()
    };

    for (id, value) in values {
        target.insert_value(id, value);
    }
    for state in computed {
        target.install_computed(state, None);
    }
    for child in &children {
        let copy = target.add_child_container();
        copy_into(child, &copy);
    }
}
