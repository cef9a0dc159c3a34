//! The property tree.
//!
//! - [`Container`]: tree node holding, inheriting and observing properties
//! - [`Computed`]: derived property recomputed from other properties
//! - [`EmitMode`]: how an emission pass treats shared observer slots

mod computed;
mod container;
mod emit;
mod node;

pub use computed::Computed;
pub use container::{Container, WeakContainer};
pub use emit::EmitMode;

pub(crate) use node::NodeRef;
