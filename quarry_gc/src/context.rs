//! The thread-local collector binding and the static entry points.
//!
//! Each thread owns at most one active collector instance. Constructors
//! bind the instance they build; a later constructor on the same thread
//! overwrites the binding. The entry points here locate the bound
//! instance, so allocation and root registration can be written without
//! threading a collector handle through every call site.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::collector::Collector;
use crate::refs::GcRef;
use crate::trace::{drop_erased, trace_erased, Trace};

thread_local! {
    static CURRENT: Cell<Option<NonNull<dyn Collector>>> = Cell::new(None);
}

/// Make `collector` the current thread's collector.
pub(crate) fn bind(collector: NonNull<dyn Collector>) {
    CURRENT.with(|slot| slot.set(Some(collector)));
}

/// The current thread's collector, if one is bound.
pub(crate) fn current() -> Option<NonNull<dyn Collector>> {
    CURRENT.with(|slot| slot.get())
}

/// Clear the binding, but only if `collector` still holds it. Called by
/// collector destructors; a newer instance's binding is left alone.
pub(crate) fn unbind(collector: NonNull<dyn Collector>) {
    CURRENT.with(|slot| {
        if let Some(bound) = slot.get() {
            if bound.as_ptr() as *mut u8 as usize == collector.as_ptr() as *mut u8 as usize {
                slot.set(None);
            }
        }
    });
}

/// The current collector, or a fatal precondition violation.
pub(crate) fn expect_current() -> NonNull<dyn Collector> {
    current().expect("no collector is bound to the current thread")
}

/// Allocate `value` in the current thread's collector.
///
/// Returns a null reference only when the bound collector is the
/// two-space back-end configured with [`crate::OomPolicy::ReturnNull`]
/// and the arena is exhausted; `value` is dropped in that case.
///
/// # Panics
///
/// Panics if no collector is bound to the current thread.
pub fn alloc<T: Trace>(value: T) -> GcRef<T> {
    let collector = expect_current();
    let raw = unsafe {
        collector
            .as_ref()
            .alloc_raw(std::mem::size_of::<T>(), trace_erased::<T>, drop_erased::<T>)
    };
    if raw.is_null() {
        return GcRef::null();
    }
    let ptr = raw.cast::<T>();
    unsafe {
        ptr.write(value);
        GcRef::from_raw(ptr)
    }
}

/// Allocate an object of type `T` with `trailing` extra bytes after it,
/// for types that end in an inline array sized at run time.
///
/// # Safety
///
/// The returned body is uninitialized. The caller must fully initialize
/// it — the `T` prefix and every trailing byte the type's [`Trace`] impl
/// will look at — before the next allocation, collection or trace.
pub unsafe fn alloc_uninit<T: Trace>(trailing: usize) -> GcRef<T> {
    let collector = expect_current();
    let raw = collector.as_ref().alloc_raw(
        std::mem::size_of::<T>() + trailing,
        trace_erased::<T>,
        drop_erased::<T>,
    );
    if raw.is_null() {
        return GcRef::null();
    }
    GcRef::from_raw(raw.cast::<T>())
}

/// Run a collection cycle on the current thread's collector.
///
/// # Panics
///
/// Panics if no collector is bound to the current thread.
pub fn collect() {
    unsafe { expect_current().as_ref() }.collect();
}

/// Run a collection cycle if allocations since the last one exceed the
/// configured trigger threshold.
///
/// # Panics
///
/// Panics if no collector is bound to the current thread.
pub fn allow_collect() {
    unsafe { expect_current().as_ref() }.allow_collect();
}

/// Bytes allocated on the current thread's collector since its last
/// collection.
///
/// # Panics
///
/// Panics if no collector is bound to the current thread.
pub fn total_allocated() -> usize {
    unsafe { expect_current().as_ref() }.total_allocated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::marksweep::MarkSweepCollector;
    use crate::config::GcConfig;

    #[test]
    fn test_no_binding_by_default() {
        // Tests run on fresh threads, so nothing is bound until a
        // collector is constructed.
        assert!(current().is_none());
    }

    #[test]
    #[should_panic(expected = "no collector is bound")]
    fn test_alloc_without_collector_panics() {
        let _ = alloc(42u64);
    }

    #[test]
    fn test_constructor_binds_and_drop_unbinds() {
        {
            let _gc = MarkSweepCollector::new(GcConfig::default());
            assert!(current().is_some());
        }
        assert!(current().is_none());
    }

    #[test]
    fn test_newer_binding_survives_older_drop() {
        let first = MarkSweepCollector::new(GcConfig::default());
        let second = MarkSweepCollector::new(GcConfig::default());
        let bound = current().expect("second collector must be bound");
        drop(first);
        // Dropping the stale instance must not clear the newer binding.
        assert_eq!(
            current().map(|p| p.as_ptr() as *mut u8 as usize),
            Some(bound.as_ptr() as *mut u8 as usize)
        );
        drop(second);
        assert!(current().is_none());
    }
}
