//! Object tracing.
//!
//! The [`Trace`] trait is the single obligation a managed type owes the
//! collector: visit every managed-reference field. The collector performs
//! the byte move itself, so there is no per-type clone hook; a type that
//! holds no managed references implements `trace` as a no-op.
//!
//! The [`Tracer`] visitor carries the back-end's semantics. For the copying
//! back-ends [`Tracer::visit`] relocates the target and returns its new
//! address; for mark-and-sweep it marks the target and returns the same
//! address. Either way the caller must store the returned pointer back
//! into the slot it read it from — that rewrite is what keeps every live
//! reference pointing at the authoritative copy.

use crate::roots::WeakNode;

/// Type-erased trace hook stored in every object header.
///
/// # Safety
///
/// `obj` must point at a live, fully initialized object body of the type
/// the hook was instantiated for.
pub type TraceFn = unsafe fn(*mut u8, &mut dyn Tracer);

/// Type-erased drop hook recorded by the mark-sweep back-end.
pub(crate) type DropFn = unsafe fn(*mut u8);

/// Monomorphized [`TraceFn`] for a concrete `T`.
pub(crate) unsafe fn trace_erased<T: Trace>(obj: *mut u8, tracer: &mut dyn Tracer) {
    (*obj.cast::<T>()).trace(tracer)
}

/// Monomorphized [`DropFn`] for a concrete `T`.
pub(crate) unsafe fn drop_erased<T>(obj: *mut u8) {
    std::ptr::drop_in_place(obj.cast::<T>())
}

/// Visitor passed to [`Trace::trace`] during a collection cycle.
///
/// Implemented by each back-end; user code only forwards it to fields.
pub trait Tracer {
    /// Visit one strong reference.
    ///
    /// Returns the post-visit address of the object: the relocated copy
    /// for a copying back-end, the unchanged address for mark-and-sweep,
    /// the unchanged address for foreign objects, null for null. The
    /// caller must write the returned pointer back into the slot.
    fn visit(&mut self, obj: *mut u8) -> *mut u8;

    /// Visit one weak reference.
    ///
    /// Registers the node in the cycle's transient weak list (only when
    /// its target is non-null); the list is swept once tracing finishes.
    fn visit_weak(&mut self, node: &mut WeakNode);
}

/// Trait for types that live in the managed heap.
///
/// # Safety
///
/// Implementations must visit **every** managed reference the value holds
/// ([`crate::GcRef`] and [`crate::GcWeak`] fields, directly or through
/// containers). A skipped strong field dangles after the next copying
/// cycle; a skipped weak field is never cleared.
///
/// Values of implementing types are relocated with a plain byte copy and,
/// in the copying back-ends, abandoned without `Drop` — both are exactly
/// the semantics of a move, so ordinary owned fields (`String`, `Vec`)
/// are sound.
pub unsafe trait Trace {
    /// Forward the tracer to every managed-reference field.
    fn trace(&mut self, tracer: &mut dyn Tracer);
}

// =============================================================================
// Trace implementations for reference-free types
// =============================================================================

macro_rules! leaf_trace {
    ($($ty:ty),* $(,)?) => {
        $(
            unsafe impl Trace for $ty {
                #[inline]
                fn trace(&mut self, _tracer: &mut dyn Tracer) {}
            }
        )*
    };
}

leaf_trace!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    usize,
    i8,
    i16,
    i32,
    i64,
    isize,
    f32,
    f64,
    String,
);

// =============================================================================
// Trace implementations for containers
// =============================================================================

unsafe impl<T: Trace> Trace for Option<T> {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        if let Some(inner) = self {
            inner.trace(tracer);
        }
    }
}

unsafe impl<T: Trace, const N: usize> Trace for [T; N] {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        for item in self.iter_mut() {
            item.trace(tracer);
        }
    }
}

unsafe impl<T: Trace> Trace for [T] {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        for item in self.iter_mut() {
            item.trace(tracer);
        }
    }
}

unsafe impl<T: Trace> Trace for Vec<T> {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        for item in self.iter_mut() {
            item.trace(tracer);
        }
    }
}

unsafe impl<A> Trace for smallvec::SmallVec<A>
where
    A: smallvec::Array,
    A::Item: Trace,
{
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        for item in self.iter_mut() {
            item.trace(tracer);
        }
    }
}

// =============================================================================
// Test tracers
// =============================================================================

/// A tracer that leaves every reference in place and counts visits.
#[cfg(test)]
pub(crate) struct CountingTracer {
    pub visits: usize,
    pub weak_visits: usize,
}

#[cfg(test)]
impl CountingTracer {
    pub fn new() -> Self {
        Self {
            visits: 0,
            weak_visits: 0,
        }
    }
}

#[cfg(test)]
impl Tracer for CountingTracer {
    fn visit(&mut self, obj: *mut u8) -> *mut u8 {
        self.visits += 1;
        obj
    }

    fn visit_weak(&mut self, _node: &mut WeakNode) {
        self.weak_visits += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_types_visit_nothing() {
        let mut tracer = CountingTracer::new();

        42u64.trace(&mut tracer);
        true.trace(&mut tracer);
        "hello".to_string().trace(&mut tracer);

        assert_eq!(tracer.visits, 0);
    }

    #[test]
    fn test_containers_forward_to_elements() {
        struct Leafy(#[allow(dead_code)] u32);
        unsafe impl Trace for Leafy {
            fn trace(&mut self, tracer: &mut dyn Tracer) {
                tracer.visit(std::ptr::null_mut());
            }
        }

        let mut tracer = CountingTracer::new();

        let mut items = vec![Leafy(1), Leafy(2), Leafy(3)];
        items.trace(&mut tracer);
        assert_eq!(tracer.visits, 3);

        let mut arr = [Leafy(4), Leafy(5)];
        arr.trace(&mut tracer);
        assert_eq!(tracer.visits, 5);

        let mut none: Option<Leafy> = None;
        none.trace(&mut tracer);
        assert_eq!(tracer.visits, 5);
    }
}
