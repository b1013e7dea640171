//! Oversized objects: placed in dedicated large segments, copied while
//! reachable, released when dropped, promoted whole while pinned.

use std::sync::atomic::Ordering;

use quarry_gc::{CopyingCollector, GcArray, GcConfig, GcPin, Rooted};

const SEGMENT: usize = 64 * 1024;
/// 128KB of u64s: twice the standard segment size.
const BIG: usize = 16 * 1024;

fn small_config() -> GcConfig {
    GcConfig {
        segment_size: SEGMENT,
        verify_heap: true,
        ..Default::default()
    }
}

#[test]
fn test_oversized_object_survives_and_relocates() {
    let gc = CopyingCollector::new(small_config());

    let mut root = Rooted::new(GcArray::<u64>::new(BIG));
    for i in 0..BIG {
        root[i] = i as u64;
    }
    let before = root.as_ptr();

    gc.collect();

    // The object was copied into a fresh large segment and the old one
    // released.
    assert_ne!(root.as_ptr(), before);
    assert_eq!(root.len(), BIG);
    for i in (0..BIG).step_by(1023) {
        assert_eq!(root[i], i as u64);
    }
    assert_eq!(
        gc.stats().large_segments_freed.load(Ordering::Relaxed),
        1
    );
}

#[test]
fn test_unreferenced_oversized_object_is_released() {
    let gc = CopyingCollector::new(small_config());

    GcArray::<u64>::new(BIG);
    GcArray::<u64>::new(BIG);
    gc.collect();

    assert_eq!(
        gc.stats().large_segments_freed.load(Ordering::Relaxed),
        2
    );
    assert_eq!(gc.total_allocated(), 0);
}

#[test]
fn test_pinned_oversized_object_is_promoted_whole() {
    let gc = CopyingCollector::new(small_config());

    let big = GcArray::<u64>::new(BIG);
    let pin = GcPin::new(big);
    let address = big.as_ptr();

    gc.collect();

    assert_eq!(pin.get().as_ptr(), address);
    assert_eq!(
        gc.stats().segments_promoted.load(Ordering::Relaxed),
        1
    );
    assert_eq!(
        gc.stats().large_segments_freed.load(Ordering::Relaxed),
        0
    );

    // Released, the next cycle frees the large segment.
    drop(pin);
    gc.collect();
    assert_eq!(
        gc.stats().large_segments_freed.load(Ordering::Relaxed),
        1
    );
}
