//! Error taxonomy for the property system.
//!
//! Most "nothing to do" conditions (changing, touching or removing a property
//! nobody owns, disconnecting from a signal that was never created) are silent
//! no-ops and never show up here. The variants below describe programmer
//! errors: the `try_*` operations on [`Container`](crate::Container) return
//! them, while the infallible operations report them through
//! [`report_misuse`], which is loud in debug builds.

use thiserror::Error;

use crate::property::DescriptorId;

/// Result alias for the fallible container operations.
pub type PropertyResult<T> = Result<T, PropertyError>;

/// Misuse of the property system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// Stored value does not have the type the descriptor promises.
    #[error("type mismatch for property {descriptor}: expected {expected}, found {found}")]
    TypeMismatch {
        descriptor: DescriptorId,
        expected: &'static str,
        found: &'static str,
    },

    /// `change_property` was called on a computed property.
    #[error("property {descriptor} is computed and cannot be changed directly")]
    ComputedMutation { descriptor: DescriptorId },

    /// A plain value and a computed property were swapped without removing the old one first.
    #[error(
        "property {descriptor} already holds a value of a different kind; \
         remove it before replacing it"
    )]
    OwnershipConflict { descriptor: DescriptorId },

    /// The container passed to `add_child` already has a parent.
    #[error("container is already attached to a parent")]
    AlreadyAttached,

    /// The container passed to `add_child` is the receiver or one of its ancestors.
    #[error("container cannot become a descendant of itself")]
    CyclicAttachment,
}

/// Report a misuse that the infallible API swallowed.
///
/// Logs the error and asserts in debug builds. Release builds continue with
/// the caller's fallback behavior.
pub(crate) fn report_misuse(err: &PropertyError) {
    tracing::error!(error = %err, "property system misuse");
    debug_assert!(false, "{err}");
}
