//! Copying collection over a segmented heap.
//!
//! Allocation bumps a pointer inside the current segment; a collection
//! copies every reachable object into fresh segments and recycles the old
//! ones wholesale. Objects a pin holds in place are the exception: their
//! host segment is promoted untouched and only their *referents* move.
//!
//! # Cycle phases
//!
//! ```text
//! flip ─▶ pin pre-pass ─▶ pin trace ─▶ root trace ─▶ weak sweep ─▶ reclaim
//! ```
//!
//! 1. **Flip.** The used-segment list is detached, the bump pointer and
//!    the `allocated` counter reset, the transient weak list emptied, and
//!    the auto-collect threshold raised to infinity so a nested trigger
//!    degenerates into "already collecting".
//! 2. **Pin pre-pass.** Every pinned object's host segment is tagged
//!    `PINNED` and its header word is set to its own address — the
//!    sentinel the copier reads as "do not move".
//! 3. **Pin trace.** The copier visits each pinned object: the sentinel
//!    short-circuits the move, its referents are cloned into new segments.
//! 4. **Root trace.** Every root rewrites its payload to the copy of its
//!    target, newest registration first.
//! 5. **Weak sweep.** Weak references visited during tracing are
//!    retargeted (target copied), cleared (dead self object) or left
//!    alone (foreign object).
//! 6. **Reclaim.** The old list is drained: pinned segments are promoted
//!    into the new used list, large ones freed, the rest pooled.

use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use slog::{debug, o, Logger};

use crate::collector::Collector;
use crate::config::GcConfig;
use crate::context;
use crate::heap::segment::{Segment, SegmentPool};
use crate::heap::{align_up, CopyHeader, ALIGN, COPIED};
use crate::refs::GcRef;
use crate::roots::{PinList, PinNode, RootList, RootNode, WeakList, WeakNode};
use crate::stats::{GcStats, GcTimer};
use crate::trace::{trace_erased, DropFn, Trace, TraceFn, Tracer};

/// The segmented copying collector.
///
/// One instance per thread; the constructor binds it as the thread's
/// current collector. All entry points must be called on the owning
/// thread.
pub struct CopyingCollector {
    inner: Box<CopyingInner>,
}

impl CopyingCollector {
    /// Create a collector and bind it to the current thread.
    ///
    /// # Panics
    ///
    /// Panics if `config` fails validation.
    pub fn new(config: GcConfig) -> Self {
        Self::with_logger(config, Logger::root(slog::Discard, o!()))
    }

    /// Like [`CopyingCollector::new`], with a logger that receives one
    /// record per finished collection cycle.
    pub fn with_logger(config: GcConfig, logger: Logger) -> Self {
        config.validate().expect("invalid collector configuration");
        let inner = Box::new(CopyingInner {
            segment_size: config.segment_size,
            trigger_threshold: config.trigger_threshold,
            auto_threshold: Cell::new(config.auto_threshold),
            verify_heap: config.verify_heap,
            pool: SegmentPool::new(config.segment_size),
            used: Cell::new(config.segment_size),
            allocated: Cell::new(0),
            roots: RootList::new(),
            pins: PinList::new(),
            weaks: WeakList::new(),
            stats: GcStats::new(),
            logger,
        });
        context::bind(NonNull::from(&*inner as &dyn Collector));
        Self { inner }
    }

    /// Allocate `value` in this collector's heap.
    pub fn alloc<T: Trace>(&self, value: T) -> GcRef<T> {
        let raw = self
            .inner
            .alloc_impl(std::mem::size_of::<T>(), trace_erased::<T>);
        let ptr = raw.cast::<T>();
        unsafe {
            ptr.write(value);
            GcRef::from_raw(ptr)
        }
    }

    /// Run a collection cycle now.
    pub fn collect(&self) {
        self.inner.run_cycle();
    }

    /// Run a collection cycle if the trigger threshold has been crossed.
    pub fn allow_collect(&self) {
        Collector::allow_collect(&*self.inner);
    }

    /// Bytes allocated since the last collection.
    pub fn total_allocated(&self) -> usize {
        self.inner.allocated.get()
    }

    /// This instance's counters.
    pub fn stats(&self) -> &GcStats {
        &self.inner.stats
    }
}

impl Drop for CopyingCollector {
    fn drop(&mut self) {
        context::unbind(NonNull::from(&*self.inner as &dyn Collector));
        // Segments are released by the pool; copying back-ends do not
        // finalize user objects.
    }
}

struct CopyingInner {
    segment_size: usize,
    trigger_threshold: usize,
    auto_threshold: Cell<usize>,
    verify_heap: bool,
    pool: SegmentPool,
    /// Bump offset into the current segment's payload area.
    used: Cell<usize>,
    /// Bytes allocated since the last collection.
    allocated: Cell<usize>,
    roots: RootList,
    pins: PinList,
    weaks: WeakList,
    stats: GcStats,
    logger: Logger,
}

impl CopyingInner {
    /// Identity used in segment owner fields to tell self from foreign.
    #[inline]
    fn owner_token(&self) -> *const () {
        self as *const CopyingInner as *const ()
    }

    fn alloc_impl(&self, size: usize, trace: TraceFn) -> *mut u8 {
        if self.allocated.get() > self.auto_threshold.get() {
            self.run_cycle();
        }
        let total = align_up(CopyHeader::SIZE + size, ALIGN);
        if self.used.get() + total > self.segment_size {
            self.pool.obtain(total, self.owner_token());
            self.used.set(0);
        }
        let seg = unsafe { &*self.pool.current() };
        let base = unsafe { seg.data().add(self.used.get()) };
        self.used.set(self.used.get() + total);
        self.allocated.set(self.allocated.get() + total);

        let body_size = total - CopyHeader::SIZE;
        unsafe {
            base.cast::<CopyHeader>().write(CopyHeader {
                word: Cell::new(seg as *const Segment as usize),
                size: body_size,
                trace,
            });
        }
        self.stats.record_allocation(total);
        unsafe { base.add(CopyHeader::SIZE) }
    }

    /// The copy discipline: relocate one reference, returning the address
    /// the caller must store back.
    fn copy_obj(&self, obj: *mut u8) -> *mut u8 {
        if obj.is_null() {
            return obj;
        }
        let hdr = unsafe { CopyHeader::of_body(obj) };
        let word = hdr.word.get();
        if word & COPIED != 0 {
            return hdr.forwarded();
        }
        if word == obj as usize {
            // Pinned this cycle: mark it visited so later encounters
            // short-circuit, then clone its referents in place.
            hdr.word.set(word | COPIED);
            let mut tracer = CopyTracer { gc: self };
            unsafe { (hdr.trace)(obj, &mut tracer) };
            return obj;
        }
        let seg = unsafe { &*(word as *mut Segment) };
        if seg.owner() != self.owner_token() {
            // Foreign object: left to its owning collector, referents
            // included.
            return obj;
        }

        // Relocate. The forwarding word is installed before the copy's
        // referents are traced, so reference cycles terminate here.
        let size = hdr.size;
        let dest = self.alloc_impl(size, hdr.trace);
        hdr.word.set(dest as usize | COPIED);
        unsafe {
            std::ptr::copy_nonoverlapping(obj, dest, size);
            let dest_hdr = CopyHeader::of_body(dest);
            let mut tracer = CopyTracer { gc: self };
            (dest_hdr.trace)(dest, &mut tracer);
        }
        self.stats.bytes_copied.fetch_add(size as u64, Ordering::Relaxed);
        dest
    }

    fn run_cycle(&self) {
        let timer = GcTimer::start();
        let saved_auto = self.auto_threshold.replace(usize::MAX);
        let reclaimable = self.allocated.get();

        // Flip.
        let old = self.pool.take_used();
        self.used.set(self.segment_size);
        self.allocated.set(0);
        self.weaks.clear();

        // Pin pre-pass.
        self.pins.for_each(|pin| {
            let obj = pin.obj.get();
            let hdr = unsafe { CopyHeader::of_body(obj) };
            let word = hdr.word.get();
            if word == obj as usize {
                // Second pin of the same object; the first one owns the
                // header restore.
                pin.home.set(std::ptr::null_mut());
                return;
            }
            let seg = word as *mut Segment;
            pin.home.set(seg);
            unsafe { &*seg }.tag_pinned();
            hdr.word.set(obj as usize);
        });

        // Pin trace.
        self.pins.for_each(|pin| {
            self.copy_obj(pin.obj.get());
        });

        // Root trace.
        let mut tracer = CopyTracer { gc: self };
        self.roots.trace_all(&mut tracer);

        // Weak sweep.
        let mut cleared = 0u64;
        let mut retargeted = 0u64;
        self.weaks.for_each(|node| {
            let obj = node.obj.get();
            let hdr = unsafe { CopyHeader::of_body(obj) };
            let word = hdr.word.get();
            if word & COPIED != 0 {
                let fwd = hdr.forwarded();
                if fwd != obj {
                    retargeted += 1;
                }
                node.obj.set(fwd);
            } else if unsafe { &*(word as *mut Segment) }.owner() == self.owner_token() {
                node.obj.set(std::ptr::null_mut());
                cleared += 1;
            }
        });

        // Pinned objects keep their address, so their headers must read
        // as "segment back-pointer" again before the next cycle.
        self.pins.for_each(|pin| {
            let home = pin.home.get();
            if home.is_null() {
                return;
            }
            let hdr = unsafe { CopyHeader::of_body(pin.obj.get()) };
            hdr.word.set(home as usize);
            pin.home.set(std::ptr::null_mut());
        });

        // Reclaim.
        let counts = self.pool.release_unused(old);
        if self.verify_heap {
            self.pool.verify(self.owner_token());
        }

        let live = self.allocated.get();
        self.allocated.set(0);
        self.auto_threshold.set(saved_auto);

        let pause = timer.stop();
        let freed = reclaimable.saturating_sub(live);
        self.stats.record_collection(pause, freed);
        self.stats
            .segments_recycled
            .fetch_add(counts.recycled as u64, Ordering::Relaxed);
        self.stats
            .segments_promoted
            .fetch_add(counts.promoted as u64, Ordering::Relaxed);
        self.stats
            .large_segments_freed
            .fetch_add(counts.large_freed as u64, Ordering::Relaxed);
        self.stats.weak_cleared.fetch_add(cleared, Ordering::Relaxed);
        self.stats
            .weak_retargeted
            .fetch_add(retargeted, Ordering::Relaxed);

        debug!(self.logger, "collection finished";
            "pause_us" => pause.as_micros() as u64,
            "live_bytes" => live,
            "reclaimed_bytes" => freed,
            "segments_recycled" => counts.recycled,
            "segments_promoted" => counts.promoted,
            "large_freed" => counts.large_freed,
            "weak_cleared" => cleared,
            "weak_retargeted" => retargeted,
        );
    }
}

impl Collector for CopyingInner {
    fn alloc_raw(&self, size: usize, trace: TraceFn, _drop: DropFn) -> *mut u8 {
        self.alloc_impl(size, trace)
    }

    fn register_root(&self, node: NonNull<RootNode>) {
        self.roots.register(node);
    }

    fn unregister_root(&self, node: NonNull<RootNode>) {
        self.roots.unregister(node);
    }

    fn register_pin(&self, node: NonNull<PinNode>) {
        self.pins.register(node);
    }

    fn unregister_pin(&self, node: NonNull<PinNode>) {
        self.pins.unregister(node);
    }

    fn collect(&self) {
        self.run_cycle();
    }

    fn allow_collect(&self) {
        if self.allocated.get() > self.trigger_threshold {
            self.run_cycle();
        }
    }

    fn total_allocated(&self) -> usize {
        self.allocated.get()
    }
}

struct CopyTracer<'a> {
    gc: &'a CopyingInner,
}

impl Tracer for CopyTracer<'_> {
    #[inline]
    fn visit(&mut self, obj: *mut u8) -> *mut u8 {
        self.gc.copy_obj(obj)
    }

    #[inline]
    fn visit_weak(&mut self, node: &mut WeakNode) {
        self.gc.weaks.push(node);
    }
}
