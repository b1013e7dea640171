//! The collector back-ends and the contract they share.
//!
//! Three collectors implement one internal contract:
//!
//! - [`copying::CopyingCollector`]: copying collection over a segmented
//!   heap, with pinning, weak references and large-object segments.
//! - [`semispace::SemiSpaceCollector`]: compact two-space copying
//!   collection over a fixed-size arena.
//! - [`marksweep::MarkSweepCollector`]: mark-and-sweep with per-object
//!   allocation through the system allocator.
//!
//! The smart references in [`crate::refs`] and the crate-level entry
//! points in [`crate::context`] talk to whichever instance is bound to
//! the current thread through this contract, so user code is written once
//! and runs against any back-end.

pub(crate) mod copying;
pub(crate) mod marksweep;
pub(crate) mod semispace;

use std::ptr::NonNull;

use crate::roots::{PinNode, RootNode};
use crate::trace::{DropFn, TraceFn};

/// The operations every back-end provides. Object-safe; a pointer to the
/// bound instance lives in the thread-local slot.
pub(crate) trait Collector {
    /// Allocate `size` body bytes, returning the body address.
    ///
    /// Null is returned only by the two-space back-end under
    /// [`crate::OomPolicy::ReturnNull`]; the other failure modes abort.
    fn alloc_raw(&self, size: usize, trace: TraceFn, drop: DropFn) -> *mut u8;

    fn register_root(&self, node: NonNull<RootNode>);
    fn unregister_root(&self, node: NonNull<RootNode>);
    fn register_pin(&self, node: NonNull<PinNode>);
    fn unregister_pin(&self, node: NonNull<PinNode>);

    /// Run a collection cycle unconditionally.
    fn collect(&self);

    /// Run a collection cycle only if the bytes allocated since the last
    /// one exceed the trigger threshold.
    fn allow_collect(&self);

    /// Bytes allocated since the last collection.
    fn total_allocated(&self) -> usize;
}
