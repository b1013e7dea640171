//! Quarry: a per-thread precise garbage collector.
//!
//! Each thread owns at most one collector instance; the constructor binds
//! it to the thread and the crate-level entry points ([`alloc`],
//! [`collect`], [`allow_collect`], [`total_allocated`]) locate it through
//! that binding. Three back-ends implement the same contract:
//!
//! - [`CopyingCollector`]: copying collection over a segmented heap.
//!   Allocation bumps a pointer inside the current segment; collection
//!   copies the live graph into fresh segments and recycles the old ones
//!   wholesale. Supports [object pinning](GcPin), [weak
//!   references](GcWeak) and oversized objects in dedicated large
//!   segments.
//! - [`SemiSpaceCollector`]: compact two-space copying collection over a
//!   fixed arena, with a configurable out-of-memory policy.
//! - [`MarkSweepCollector`]: mark-and-sweep over individually allocated
//!   objects; the only back-end that runs destructors on reclamation.
//!
//! # The per-type obligation
//!
//! A managed type implements [`Trace`] and nothing else: visit every
//! [`GcRef`] and [`GcWeak`] field with the supplied [`Tracer`]. The
//! collector handles the rest — sizes and relocation are recorded in the
//! object header at allocation time.
//!
//! ```ignore
//! use quarry_gc::{alloc, GcConfig, GcRef, CopyingCollector, Rooted, Trace, Tracer};
//!
//! struct Tree {
//!     label: u64,
//!     left: GcRef<Tree>,
//!     right: GcRef<Tree>,
//! }
//!
//! unsafe impl Trace for Tree {
//!     fn trace(&mut self, tracer: &mut dyn Tracer) {
//!         self.left.trace(tracer);
//!         self.right.trace(tracer);
//!     }
//! }
//!
//! let gc = CopyingCollector::new(GcConfig::default());
//! let root = Rooted::new(alloc(Tree {
//!     label: 1,
//!     left: GcRef::null(),
//!     right: GcRef::null(),
//! }));
//! gc.collect(); // root survives, possibly at a new address
//! ```
//!
//! # Relocation hazards
//!
//! In the copying back-ends, any reference not reachable from a
//! [`Rooted`] or [`GcPin`] is invalidated by a collection — and with a
//! finite `auto_threshold`, *any allocation* may run one. Code that holds
//! raw references across allocations must either root them, pin their
//! targets, or collect only at explicit points ([`collect`] /
//! [`allow_collect`]), which is the regime the sample binary runs in.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collector;
pub mod config;
pub mod objects;
pub mod stats;
pub mod trace;

mod context;
mod heap;
mod refs;
mod roots;

// Re-exports for convenient access
pub use collector::copying::CopyingCollector;
pub use collector::marksweep::MarkSweepCollector;
pub use collector::semispace::SemiSpaceCollector;
pub use config::{ConfigError, GcConfig, OomPolicy};
pub use context::{alloc, alloc_uninit, allow_collect, collect, total_allocated};
pub use objects::{GcArray, GcStr};
pub use refs::{rooted_vec, GcPin, GcRef, GcWeak, Rooted, RootedVec};
pub use roots::WeakNode;
pub use stats::GcStats;
pub use trace::{Trace, TraceFn, Tracer};
