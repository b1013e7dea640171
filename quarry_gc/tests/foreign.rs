//! Foreign isolation: tracing that reaches an object owned by another
//! collector instance leaves it, and everything behind it, untouched.
//!
//! Binding is per thread and a newer constructor overwrites it, so two
//! instances can coexist on one thread; objects of the older one are
//! "foreign" to the newer one.

use quarry_gc::{CopyingCollector, GcConfig, GcRef, GcWeak, Rooted, Trace, Tracer};

struct Node {
    value: u64,
    next: GcRef<Node>,
}

unsafe impl Trace for Node {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        self.next.trace(tracer);
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
fn test_foreign_objects_survive_unmoved() {
    let home = CopyingCollector::new(small_config());

    // A two-node chain owned by the first collector.
    let foreign_tail = home.alloc(Node {
        value: 20,
        next: GcRef::null(),
    });
    let foreign_head = home.alloc(Node {
        value: 10,
        next: foreign_tail,
    });
    let head_addr = foreign_head.as_ptr();
    let tail_addr = foreign_tail.as_ptr();

    // A second collector takes over the thread; its object graph crosses
    // into the first collector's heap.
    let guest = CopyingCollector::new(small_config());
    let root = Rooted::new(guest.alloc(Node {
        value: 1,
        next: foreign_head,
    }));

    guest.collect();

    // The guest's own object moved; the foreign chain did not, and the
    // reference into it was left as-is.
    assert_eq!(root.value, 1);
    assert_eq!(root.next.as_ptr(), head_addr);
    assert_eq!(root.next.value, 10);
    assert_eq!(root.next.next.as_ptr(), tail_addr);
    assert_eq!(root.next.next.value, 20);
    assert_eq!(guest.stats().bytes_copied.load(std::sync::atomic::Ordering::Relaxed) as usize,
        std::mem::size_of::<Node>());

    drop(root);
    drop(guest);
    drop(home);
}

#[test]
fn test_weak_to_foreign_object_is_left_alone() {
    let home = CopyingCollector::new(small_config());
    let foreign = home.alloc(Node {
        value: 5,
        next: GcRef::null(),
    });
    let addr = foreign.as_ptr();

    let guest = CopyingCollector::new(small_config());
    let weak = Rooted::new(GcWeak::new(foreign));

    guest.collect();

    // Neither cleared nor retargeted: the target is not the guest's to
    // judge.
    assert_eq!(weak.get().as_ptr(), addr);
    assert_eq!(weak.get().value, 5);

    drop(weak);
    drop(guest);
    drop(home);
}
