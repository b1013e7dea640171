//! Smart references through which user code exposes its object graph to
//! the collector.
//!
//! Four abstractions compose:
//!
//! - [`GcRef<T>`]: a plain, nullable reference used as a *field* inside
//!   another managed object. Its [`Trace`] impl passes it through the
//!   tracer and stores the returned address back, which is the entire
//!   protocol a field owes the collector.
//! - [`Rooted<P>`]: a payload registered with the current collector so
//!   that everything reachable from it survives collection.
//!   `Rooted<GcRef<T>>` is the ordinary rooted variable;
//!   `Rooted<[GcRef<T>; N]>` roots a fixed array; [`RootedVec<T>`] roots
//!   a growable one.
//! - [`GcPin<T>`]: asserts that the target must survive *and must not
//!   move*; its address is identical across every collection that runs
//!   while the pin exists.
//! - [`GcWeak<T>`]: a reference that does not keep its target alive; the
//!   collector retargets it when the target moves and clears it to null
//!   when the target dies.
//!
//! Registration happens in constructors and is undone in `Drop`, so the
//! borrow discipline is ordinary RAII. Every handle here must be dropped
//! before the collector it was created under.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use smallvec::SmallVec;

use crate::collector::Collector;
use crate::context;
use crate::roots::{PinNode, RootNode, WeakNode};
use crate::trace::{Trace, Tracer};

// =============================================================================
// GcRef
// =============================================================================

/// A nullable reference to a managed object.
///
/// `GcRef` does **not** protect its target: across an allocation that may
/// trigger a collection (or an explicit `collect`), only references
/// reachable from a [`Rooted`] or [`GcPin`] remain valid. Inside managed
/// objects it is the required field type — its `Trace` impl is what lets
/// the collector find and rewrite the reference.
pub struct GcRef<T: Trace> {
    ptr: *mut T,
}

impl<T: Trace> GcRef<T> {
    /// The null reference.
    #[inline]
    pub const fn null() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
        }
    }

    /// Create a reference from a raw body pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or the body address of a live object of type
    /// `T` managed by a collector on this thread.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self { ptr }
    }

    /// Whether this is the null reference.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// The raw body pointer.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr
    }
}

impl<T: Trace> Clone for GcRef<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Trace> Copy for GcRef<T> {}

impl<T: Trace> Default for GcRef<T> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Trace> Deref for GcRef<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        debug_assert!(!self.ptr.is_null(), "dereferencing a null GcRef");
        unsafe { &*self.ptr }
    }
}

impl<T: Trace> DerefMut for GcRef<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        debug_assert!(!self.ptr.is_null(), "dereferencing a null GcRef");
        unsafe { &mut *self.ptr }
    }
}

impl<T: Trace> PartialEq for GcRef<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: Trace> Eq for GcRef<T> {}

impl<T: Trace> std::hash::Hash for GcRef<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
    }
}

impl<T: Trace> std::fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GcRef({:p})", self.ptr)
    }
}

/// Safety: passes the reference through the tracer and stores the
/// returned address — the self-update rule that keeps every surviving
/// reference pointing at the authoritative copy.
unsafe impl<T: Trace> Trace for GcRef<T> {
    #[inline]
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        self.ptr = tracer.visit(self.ptr.cast::<u8>()).cast::<T>();
    }
}

// =============================================================================
// GcWeak
// =============================================================================

/// A weak reference: does not keep its target alive.
///
/// Usable both as a field of a managed object and as the payload of a
/// [`Rooted`]. The collector only learns about a weak reference when it
/// is *traced* during a cycle; it is then swept once tracing completes —
/// retargeted if the target survived, cleared to null if a dead self
/// object, left alone if foreign. A weak reference reachable only from a
/// dead object is reclaimed together with that object and is never
/// visited at all.
pub struct GcWeak<T: Trace> {
    node: WeakNode,
    _marker: PhantomData<*mut T>,
}

impl<T: Trace> GcWeak<T> {
    /// A weak reference to `target` (which may be null).
    pub fn new(target: GcRef<T>) -> Self {
        Self {
            node: WeakNode::new(target.as_ptr().cast::<u8>()),
            _marker: PhantomData,
        }
    }

    /// The cleared weak reference.
    pub fn null() -> Self {
        Self::new(GcRef::null())
    }

    /// Current target; null once the target has been collected.
    #[inline]
    pub fn get(&self) -> GcRef<T> {
        unsafe { GcRef::from_raw(self.node.obj.get().cast::<T>()) }
    }

    /// Retarget the weak reference.
    pub fn set(&self, target: GcRef<T>) {
        self.node.obj.set(target.as_ptr().cast::<u8>());
    }

    /// Whether the target has been collected (or was never set).
    #[inline]
    pub fn is_cleared(&self) -> bool {
        self.node.obj.get().is_null()
    }
}

impl<T: Trace> Clone for GcWeak<T> {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// Safety: registers the node on the cycle's transient weak list instead
/// of visiting the target, so the reference does not keep it alive.
unsafe impl<T: Trace> Trace for GcWeak<T> {
    #[inline]
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        tracer.visit_weak(&mut self.node);
    }
}

// =============================================================================
// Rooted
// =============================================================================

#[repr(C)]
struct RootBox<P: Trace> {
    node: RootNode,
    owner: NonNull<dyn Collector>,
    payload: P,
}

unsafe fn trace_rooted<P: Trace>(node: NonNull<RootNode>, tracer: &mut dyn Tracer) {
    // RootNode is the first field of RootBox, so the node address is the
    // box address.
    let boxed = node.as_ptr().cast::<RootBox<P>>();
    (*boxed).payload.trace(tracer);
}

/// A payload registered as a root of the current thread's collector.
///
/// The payload is anything that implements [`Trace`]: a single
/// [`GcRef`], an array of them, a [`GcWeak`], or a whole struct of
/// references. It is traced at every collection while the `Rooted`
/// exists, and the handle dereferences to it for ordinary access.
///
/// The registration lives in a heap box, so the handle itself may move
/// freely. Dropping the handle unregisters it from the collector it was
/// created under — which must therefore still be alive.
pub struct Rooted<P: Trace> {
    inner: Box<RootBox<P>>,
}

impl<P: Trace> Rooted<P> {
    /// Register `payload` as a root of the current thread's collector.
    ///
    /// # Panics
    ///
    /// Panics if no collector is bound to the current thread.
    pub fn new(payload: P) -> Self {
        let owner = context::expect_current();
        let inner = Box::new(RootBox {
            node: RootNode::new(trace_rooted::<P>),
            owner,
            payload,
        });
        unsafe { owner.as_ref().register_root(NonNull::from(&inner.node)) };
        Self { inner }
    }
}

impl<P: Trace> Deref for Rooted<P> {
    type Target = P;

    #[inline]
    fn deref(&self) -> &P {
        &self.inner.payload
    }
}

impl<P: Trace> DerefMut for Rooted<P> {
    #[inline]
    fn deref_mut(&mut self) -> &mut P {
        &mut self.inner.payload
    }
}

impl<P: Trace> Drop for Rooted<P> {
    fn drop(&mut self) {
        let node = NonNull::from(&self.inner.node);
        unsafe { self.inner.owner.as_ref().unregister_root(node) };
    }
}

/// A rooted growable array of references.
///
/// Dereferences to a `SmallVec`, so `push`, `pop`, `resize`, indexing and
/// iteration are all available; the first eight references live inline.
pub type RootedVec<T> = Rooted<SmallVec<[GcRef<T>; 8]>>;

/// An empty [`RootedVec`] registered with the current collector.
pub fn rooted_vec<T: Trace>() -> RootedVec<T> {
    Rooted::new(SmallVec::new())
}

// =============================================================================
// GcPin
// =============================================================================

struct PinBox {
    node: PinNode,
    owner: NonNull<dyn Collector>,
}

/// Pins a managed object: keeps it alive and fixes its address across
/// every collection that runs while the pin exists.
///
/// Pinning is what makes direct pointers into the heap (`&T`, raw
/// pointers handed to foreign code) safe to hold across allocations.
/// Only the segmented back-end and mark-and-sweep support pins; the
/// two-space collector rejects them, since objects in a flipping arena
/// always move.
pub struct GcPin<T: Trace> {
    inner: Box<PinBox>,
    _marker: PhantomData<*mut T>,
}

impl<T: Trace> GcPin<T> {
    /// Pin `target` in the current thread's collector.
    ///
    /// # Panics
    ///
    /// Panics if `target` is null or no collector is bound.
    pub fn new(target: GcRef<T>) -> Self {
        assert!(!target.is_null(), "cannot pin a null reference");
        let owner = context::expect_current();
        let inner = Box::new(PinBox {
            node: PinNode::new(target.as_ptr().cast::<u8>()),
            owner,
        });
        unsafe { owner.as_ref().register_pin(NonNull::from(&inner.node)) };
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// The pinned object.
    #[inline]
    pub fn get(&self) -> GcRef<T> {
        unsafe { GcRef::from_raw(self.inner.node.obj.get().cast::<T>()) }
    }
}

impl<T: Trace> Deref for GcPin<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.inner.node.obj.get().cast::<T>() }
    }
}

impl<T: Trace> Drop for GcPin<T> {
    fn drop(&mut self) {
        let node = NonNull::from(&self.inner.node);
        unsafe { self.inner.owner.as_ref().unregister_pin(node) };
    }
}
