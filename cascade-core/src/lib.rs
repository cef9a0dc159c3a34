//! Cascade Core
//!
//! This crate provides a hierarchical, cascading property store. It
//! implements:
//!
//! - Typed, identity-keyed property descriptors with default values
//! - A tree of containers where unset properties inherit the nearest
//!   ancestor's value
//! - Observers with batched, optionally deduplicated notification
//! - Computed properties that keep themselves current
//!
//! # Architecture
//!
//! The crate is organized into two layers:
//!
//! - `property`: descriptors, type-erased values, records and signals
//! - `tree`: containers, computed properties and the emission engine
//!
//! Everything is single-threaded: containers are `!Send` handles around
//! `Rc<RefCell<_>>` state.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use cascade_core::{Container, Descriptor};
//!
//! let font_size = Descriptor::named("font-size", 12_u32);
//!
//! let window = Container::new();
//! let label = window.add_child_container();
//!
//! let seen = Rc::new(Cell::new(0));
//! let sink = Rc::clone(&seen);
//! label.connect(&font_size, move |size: &u32| sink.set(*size));
//!
//! // Mutations are cheap and only mark records dirty.
//! window.set_property(&font_size, 14);
//! window.set_property(&font_size, 16);
//! assert_eq!(seen.get(), 0);
//!
//! // One emission pass notifies observers once.
//! assert_eq!(window.emit(), 1);
//! assert_eq!(seen.get(), 16);
//! ```

pub mod error;
pub mod property;
pub mod tree;

pub use error::{PropertyError, PropertyResult};
pub use property::{Descriptor, DescriptorId, PropertyValue, RecordState, SlotId};
pub use tree::{Computed, Container, EmitMode, WeakContainer};
