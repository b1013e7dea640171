//! Weak-reference semantics on the segmented copying back-end: cleared
//! when the target dies, retargeted when it moves, registered only when
//! visited during tracing.

use std::sync::atomic::Ordering;

use quarry_gc::{alloc, CopyingCollector, GcConfig, GcRef, GcWeak, Rooted, Trace, Tracer};

struct Pair {
    tag: u64,
    other: GcRef<Pair>,
}

unsafe impl Trace for Pair {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        self.other.trace(tracer);
    }
}

/// An object holding a weak reference as a field.
struct Watcher {
    observed: GcWeak<Pair>,
}

unsafe impl Trace for Watcher {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        self.observed.trace(tracer);
    }
}

fn pair(tag: u64) -> Pair {
    Pair {
        tag,
        other: GcRef::null(),
    }
}

fn small_config() -> GcConfig {
    GcConfig {
        segment_size: 64 * 1024,
        verify_heap: true,
        ..Default::default()
    }
}

#[test]
fn test_weak_cleared_when_strong_field_dropped() {
    let gc = CopyingCollector::new(small_config());

    let b = alloc(pair(2));
    let mut a = Rooted::new(alloc(pair(1)));
    a.other = b;
    let weak = Rooted::new(GcWeak::new(b));

    // Drop the only strong path to B.
    a.other = GcRef::null();
    gc.collect();

    assert!(weak.is_cleared());
    assert_eq!(gc.stats().weak_cleared.load(Ordering::Relaxed), 1);
}

#[test]
fn test_weak_follows_relocated_target() {
    let gc = CopyingCollector::new(small_config());

    let b = alloc(pair(2));
    let mut a = Rooted::new(alloc(pair(1)));
    a.other = b;
    let weak = Rooted::new(GcWeak::new(b));
    let before = b.as_ptr();

    gc.collect();

    let after = weak.get();
    assert!(!after.is_null());
    assert_ne!(after.as_ptr(), before, "target must have been copied");
    assert_eq!(after.as_ptr(), a.other.as_ptr(), "weak and strong agree");
    assert_eq!(after.tag, 2);
    assert_eq!(gc.stats().weak_retargeted.load(Ordering::Relaxed), 1);
}

#[test]
fn test_weak_field_inside_live_object() {
    let gc = CopyingCollector::new(small_config());

    let observed = Rooted::new(alloc(pair(3)));
    let watcher = Rooted::new(alloc(Watcher {
        observed: GcWeak::new(*observed),
    }));

    gc.collect();
    assert_eq!(watcher.observed.get().tag, 3);
    assert_eq!(watcher.observed.get(), *observed);

    drop(observed);
    gc.collect();
    assert!(watcher.observed.is_cleared());
}

#[test]
fn test_weak_reachable_only_from_dead_object_is_never_visited() {
    let gc = CopyingCollector::new(small_config());

    let target = alloc(pair(4));
    // The watcher itself is garbage: its weak reference must never reach
    // the transient list, and the cycle must not touch it.
    alloc(Watcher {
        observed: GcWeak::new(target),
    });

    gc.collect();

    assert_eq!(gc.stats().weak_cleared.load(Ordering::Relaxed), 0);
    assert_eq!(gc.stats().weak_retargeted.load(Ordering::Relaxed), 0);
}

#[test]
fn test_weak_to_pinned_object_keeps_address() {
    let gc = CopyingCollector::new(small_config());

    let obj = alloc(pair(5));
    let pin = quarry_gc::GcPin::new(obj);
    let weak = Rooted::new(GcWeak::new(obj));
    let address = obj.as_ptr();

    gc.collect();

    assert_eq!(weak.get().as_ptr(), address);
    assert_eq!(weak.get().tag, 5);
    drop(pin);
}

#[test]
fn test_null_weak_is_never_registered() {
    let gc = CopyingCollector::new(small_config());

    let weak: Rooted<GcWeak<Pair>> = Rooted::new(GcWeak::null());
    gc.collect();

    assert!(weak.is_cleared());
    assert_eq!(gc.stats().weak_cleared.load(Ordering::Relaxed), 0);
}
