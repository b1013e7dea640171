//! Heap segments and the segment pool of the segmented copying back-end.
//!
//! A segment is a contiguous block obtained from the system allocator:
//! a small header followed by the payload area objects are bumped into.
//! Segments are threaded on intrusive lists through their `next` word,
//! whose low two bits carry per-segment tags:
//!
//! - `PINNED`: the segment hosts a pinned object this cycle and must be
//!   promoted whole instead of reclaimed;
//! - `LARGE`: the segment was sized for a single oversized object and is
//!   never pooled.
//!
//! The tag bits are confined to the accessors here; every dereference of
//! a link goes through [`Segment::link`], which masks them off.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::cell::Cell;
use std::ptr::NonNull;

/// Segment hosts a pinned object this cycle.
pub(crate) const PINNED: usize = 1;
/// Segment was sized for one oversized object.
pub(crate) const LARGE: usize = 2;
/// Mask covering both tag bits.
pub(crate) const TAG_MASK: usize = 3;

/// Header of one heap segment; the payload area follows it in memory.
#[repr(C)]
pub(crate) struct Segment {
    /// Next segment in the used or free list, tag bits in the low word.
    next: Cell<usize>,
    /// The collector instance that created this segment. Tracing compares
    /// this against the running instance to tell self objects from
    /// foreign ones.
    owner: *const (),
    /// Payload bytes.
    capacity: usize,
}

impl Segment {
    const HEADER: usize = std::mem::size_of::<Segment>();

    fn layout(capacity: usize) -> Layout {
        Layout::from_size_align(Self::HEADER + capacity, super::ALIGN)
            .expect("segment size overflows a Layout")
    }

    /// Obtain a fresh segment from the system allocator.
    pub(crate) fn create(capacity: usize, owner: *const ()) -> NonNull<Segment> {
        let layout = Self::layout(capacity);
        let raw = unsafe { alloc(layout) };
        if raw.is_null() {
            handle_alloc_error(layout);
        }
        let seg = raw.cast::<Segment>();
        unsafe {
            seg.write(Segment {
                next: Cell::new(0),
                owner,
                capacity,
            });
            NonNull::new_unchecked(seg)
        }
    }

    /// Return a segment to the system allocator.
    ///
    /// # Safety
    ///
    /// `seg` must have come from [`Segment::create`] and must not be on
    /// any list.
    pub(crate) unsafe fn destroy(seg: *mut Segment) {
        let layout = Self::layout((*seg).capacity);
        dealloc(seg.cast::<u8>(), layout);
    }

    /// Start of the payload area.
    #[inline]
    pub(crate) fn data(&self) -> *mut u8 {
        unsafe { (self as *const Segment as *mut u8).add(Self::HEADER) }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn owner(&self) -> *const () {
        self.owner
    }

    /// The next segment, tags masked off.
    #[inline]
    pub(crate) fn link(&self) -> *mut Segment {
        (self.next.get() & !TAG_MASK) as *mut Segment
    }

    #[inline]
    pub(crate) fn tags(&self) -> usize {
        self.next.get() & TAG_MASK
    }

    /// Replace the link, keeping the given tags.
    #[inline]
    pub(crate) fn set_link(&self, next: *mut Segment, tags: usize) {
        debug_assert_eq!(tags & !TAG_MASK, 0);
        self.next.set(next as usize | tags);
    }

    #[inline]
    pub(crate) fn tag_pinned(&self) {
        self.next.set(self.next.get() | PINNED);
    }
}

/// Counts reported by [`SegmentPool::release_unused`].
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Reclaim {
    /// Pinned segments promoted into the new used list.
    pub promoted: usize,
    /// Standard segments returned to the free list.
    pub recycled: usize,
    /// Large segments released to the system allocator.
    pub large_freed: usize,
}

/// The segment manager: a used list of segments holding allocations and a
/// free list of empty standard segments retained for reuse.
pub(crate) struct SegmentPool {
    segment_size: usize,
    used: Cell<*mut Segment>,
    free: Cell<*mut Segment>,
}

impl SegmentPool {
    pub(crate) fn new(segment_size: usize) -> Self {
        Self {
            segment_size,
            used: Cell::new(std::ptr::null_mut()),
            free: Cell::new(std::ptr::null_mut()),
        }
    }

    /// Head of the used list: the segment allocations bump into.
    #[inline]
    pub(crate) fn current(&self) -> *mut Segment {
        self.used.get()
    }

    /// Obtain a segment able to hold `min_bytes`, push it onto the used
    /// list and return it.
    ///
    /// Oversized requests get a dedicated large segment; standard requests
    /// reuse a pooled segment when one is available.
    pub(crate) fn obtain(&self, min_bytes: usize, owner: *const ()) -> NonNull<Segment> {
        let (seg, tags) = if min_bytes > self.segment_size {
            (Segment::create(min_bytes, owner), LARGE)
        } else if let Some(seg) = self.pop_free() {
            (seg, 0)
        } else {
            (Segment::create(self.segment_size, owner), 0)
        };
        unsafe { seg.as_ref() }.set_link(self.used.get(), tags);
        self.used.set(seg.as_ptr());
        seg
    }

    /// Detach and return the whole used list (the flip).
    pub(crate) fn take_used(&self) -> *mut Segment {
        self.used.replace(std::ptr::null_mut())
    }

    /// Apply the post-cycle release policy to a detached used list.
    ///
    /// Pinned segments are promoted into the new used list *behind* the
    /// current allocation segment, so the bump pointer never resumes
    /// inside them. Large segments are released; everything else goes to
    /// the free list.
    pub(crate) fn release_unused(&self, mut old: *mut Segment) -> Reclaim {
        let mut counts = Reclaim::default();
        let head = self.used.get();
        while !old.is_null() {
            let seg = unsafe { &*old };
            let next = seg.link();
            let tags = seg.tags();
            if tags & PINNED != 0 {
                let keep = tags & LARGE;
                if head.is_null() {
                    seg.set_link(self.used.get(), keep);
                    self.used.set(old);
                } else {
                    let at = unsafe { &*head };
                    seg.set_link(at.link(), keep);
                    at.set_link(old, at.tags());
                }
                counts.promoted += 1;
            } else if tags & LARGE != 0 {
                unsafe { Segment::destroy(old) };
                counts.large_freed += 1;
            } else {
                seg.set_link(self.free.get(), 0);
                self.free.set(old);
                counts.recycled += 1;
            }
            old = next;
        }
        counts
    }

    fn pop_free(&self) -> Option<NonNull<Segment>> {
        let seg = NonNull::new(self.free.get())?;
        self.free.set(unsafe { seg.as_ref() }.link());
        Some(seg)
    }

    /// Assert the segment-list invariants. Debug aid, driven by
    /// `GcConfig::verify_heap`.
    pub(crate) fn verify(&self, owner: *const ()) {
        let mut used_set = rustc_hash::FxHashSet::default();
        let mut cur = self.used.get();
        while !cur.is_null() {
            let seg = unsafe { &*cur };
            assert!(
                used_set.insert(cur as usize),
                "segment linked twice in the used list"
            );
            assert_eq!(seg.owner(), owner, "used segment owned by another collector");
            assert_eq!(seg.tags() & PINNED, 0, "pinned tag left set after a cycle");
            cur = seg.link();
        }
        cur = self.free.get();
        while !cur.is_null() {
            let seg = unsafe { &*cur };
            assert!(
                !used_set.contains(&(cur as usize)),
                "segment on both the used and free lists"
            );
            assert_eq!(seg.tags(), 0, "tagged segment on the free list");
            assert_eq!(seg.capacity(), self.segment_size, "pooled large segment");
            cur = seg.link();
        }
    }

    /// Bytes of payload across the used list.
    #[cfg(test)]
    pub(crate) fn used_capacity(&self) -> usize {
        let mut total = 0;
        let mut cur = self.used.get();
        while !cur.is_null() {
            let seg = unsafe { &*cur };
            total += seg.capacity();
            cur = seg.link();
        }
        total
    }
}

impl Drop for SegmentPool {
    fn drop(&mut self) {
        for head in [self.used.get(), self.free.get()] {
            let mut cur = head;
            while !cur.is_null() {
                let next = unsafe { (*cur).link() };
                unsafe { Segment::destroy(cur) };
                cur = next;
            }
        }
    }
}
