//! Computed Properties
//!
//! A computed property derives its value from other properties through a pure
//! function. It lives in the tree as a hidden child of the container it was
//! installed on, and as the record of its descriptor on that container.
//!
//! # How Computed Properties Work
//!
//! 1. On install, the function runs once through the hidden child, which sees
//!    exactly what its host sees, and the result becomes the host's value.
//!
//! 2. The hidden child connects one refresh slot to each input descriptor, so
//!    the refresh rides the normal observer plumbing: it follows the input
//!    wherever ownership of it moves.
//!
//! 3. When an input is emitted, the refresh re-runs the function and stores the
//!    result. A changed result marks the host record dirty, and its own
//!    observers fire in the next emission pass.
//!
//! Reads never evaluate anything; they return the value cached by the last
//! refresh.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use indexmap::IndexSet;

use super::container::Container;
use super::node::NodeRef;
use crate::property::{AnyValue, Descriptor, DescriptorId, PropertyValue};

type EvaluateFn = Rc<dyn Fn(&Container) -> Box<dyn AnyValue>>;

/// Type-erased computation kept on the hidden node.
#[derive(Clone)]
pub(crate) struct ComputedState {
    pub(crate) descriptor: DescriptorId,
    pub(crate) inputs: Vec<DescriptorId>,
    pub(crate) evaluate: EvaluateFn,
}

impl ComputedState {
    pub(crate) fn evaluate(&self, through: &Container) -> Box<dyn AnyValue> {
        (self.evaluate)(through)
    }
}

/// A derived property, ready to be installed with
/// [`Container::set_computed`](super::Container::set_computed).
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must match the descriptor it is
///   installed on.
///
/// # Example
///
/// ```rust
/// use cascade_core::{Computed, Container, Descriptor};
///
/// let count = Descriptor::new(0_i32);
/// let label = Descriptor::new(String::new());
///
/// let root = Container::new();
/// root.set_computed(&label, Computed::map(&count, |n: &i32| format!("{n} items")));
/// assert_eq!(root.get_property(&label), "0 items");
///
/// root.set_property(&count, 3);
/// root.emit();
/// assert_eq!(root.get_property(&label), "3 items");
/// ```
pub struct Computed<T: PropertyValue> {
    inputs: Vec<DescriptorId>,
    evaluate: EvaluateFn,
    _marker: PhantomData<fn() -> T>,
}

impl<T: PropertyValue> Computed<T> {
    /// Computed property reading arbitrary properties through the container it
    /// is evaluated on. Only changes of `inputs` trigger a refresh.
    pub fn from_fn<I, F>(inputs: I, f: F) -> Self
    where
        I: IntoIterator<Item = DescriptorId>,
        F: Fn(&Container) -> T + 'static,
    {
        let inputs: IndexSet<DescriptorId> = inputs.into_iter().collect();

        Self {
            inputs: inputs.into_iter().collect(),
            evaluate: Rc::new(move |container: &Container| -> Box<dyn AnyValue> {
                Box::new(f(container))
            }),
            _marker: PhantomData,
        }
    }

    /// Derive from one input.
    pub fn map<A, F>(a: &Descriptor<A>, f: F) -> Self
    where
        A: PropertyValue,
        F: Fn(&A) -> T + 'static,
    {
        let a = a.clone();
        Self::from_fn([a.id()], move |c: &Container| f(&c.get_property(&a)))
    }

    /// Derive from two inputs.
    pub fn map2<A, B, F>(a: &Descriptor<A>, b: &Descriptor<B>, f: F) -> Self
    where
        A: PropertyValue,
        B: PropertyValue,
        F: Fn(&A, &B) -> T + 'static,
    {
        let (a, b) = (a.clone(), b.clone());
        Self::from_fn([a.id(), b.id()], move |c: &Container| {
            f(&c.get_property(&a), &c.get_property(&b))
        })
    }

    /// Derive from three inputs.
    pub fn map3<A, B, C, F>(a: &Descriptor<A>, b: &Descriptor<B>, c: &Descriptor<C>, f: F) -> Self
    where
        A: PropertyValue,
        B: PropertyValue,
        C: PropertyValue,
        F: Fn(&A, &B, &C) -> T + 'static,
    {
        let (a, b, c) = (a.clone(), b.clone(), c.clone());
        Self::from_fn([a.id(), b.id(), c.id()], move |node: &Container| {
            f(
                &node.get_property(&a),
                &node.get_property(&b),
                &node.get_property(&c),
            )
        })
    }

    /// Derive from four inputs.
    pub fn map4<A, B, C, D, F>(
        a: &Descriptor<A>,
        b: &Descriptor<B>,
        c: &Descriptor<C>,
        d: &Descriptor<D>,
        f: F,
    ) -> Self
    where
        A: PropertyValue,
        B: PropertyValue,
        C: PropertyValue,
        D: PropertyValue,
        F: Fn(&A, &B, &C, &D) -> T + 'static,
    {
        let (a, b, c, d) = (a.clone(), b.clone(), c.clone(), d.clone());
        Self::from_fn([a.id(), b.id(), c.id(), d.id()], move |node: &Container| {
            f(
                &node.get_property(&a),
                &node.get_property(&b),
                &node.get_property(&c),
                &node.get_property(&d),
            )
        })
    }

    /// Descriptors whose changes trigger a refresh.
    pub fn inputs(&self) -> &[DescriptorId] {
        &self.inputs
    }

    pub(crate) fn into_state(self, descriptor: DescriptorId) -> ComputedState {
        ComputedState {
            descriptor,
            inputs: self.inputs,
            evaluate: self.evaluate,
        }
    }
}

impl<T: PropertyValue> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Re-run the computation behind `node` and store the result on its host.
///
/// Does nothing once the computed property was removed or replaced.
pub(crate) fn refresh(node: &NodeRef) {
    let state = node.borrow().computed.clone();
    let Some(state) = state else {
        return;
    };

    let value = state.evaluate(&Container::from_node(Rc::clone(node)));

    let host = node.borrow().parent.upgrade();
    let Some(host) = host else {
        return;
    };
    let mut host = host.borrow_mut();
    let current = host
        .records
        .get(&state.descriptor)
        .is_some_and(|record| record.is_computed_by(node));
    if current {
        host.store(state.descriptor, value);
    }
}
