//! Mark-and-sweep collection with per-object allocation.
//!
//! Every allocation is obtained individually from the system allocator
//! and linked into one all-objects list through its header; the low bit
//! of the link is the mark. A collection marks everything reachable from
//! the roots, then walks the list: survivors get their bit cleared, the
//! rest are finalized with their recorded drop hook and freed.
//!
//! Objects never move, so pins reduce to keep-alive roots and raw
//! pointers stay valid across collections as long as something reachable
//! still refers to the object.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use slog::{debug, o, Logger};

use crate::collector::Collector;
use crate::config::GcConfig;
use crate::context;
use crate::heap::{align_up, SweepHeader, ALIGN, MARK};
use crate::refs::GcRef;
use crate::roots::{PinList, PinNode, RootList, RootNode, WeakList, WeakNode};
use crate::stats::{GcStats, GcTimer};
use crate::trace::{drop_erased, trace_erased, DropFn, Trace, TraceFn, Tracer};

/// The mark-and-sweep collector.
///
/// One instance per thread; the constructor binds it as the thread's
/// current collector.
pub struct MarkSweepCollector {
    inner: Box<SweepInner>,
}

impl MarkSweepCollector {
    /// Create a collector and bind it to the current thread.
    ///
    /// # Panics
    ///
    /// Panics if `config` fails validation.
    pub fn new(config: GcConfig) -> Self {
        Self::with_logger(config, Logger::root(slog::Discard, o!()))
    }

    /// Like [`MarkSweepCollector::new`], with a logger that receives one
    /// record per finished collection cycle.
    pub fn with_logger(config: GcConfig, logger: Logger) -> Self {
        config.validate().expect("invalid collector configuration");
        let inner = Box::new(SweepInner {
            trigger_threshold: config.trigger_threshold,
            auto_threshold: Cell::new(config.auto_threshold),
            objects: Cell::new(0),
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

    /// Allocate `value`.
    pub fn alloc<T: Trace>(&self, value: T) -> GcRef<T> {
        let raw = self.inner.alloc_impl(
            std::mem::size_of::<T>(),
            trace_erased::<T>,
            drop_erased::<T>,
        );
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

    /// Live objects currently on the all-objects list.
    pub fn live_objects(&self) -> usize {
        let mut n = 0;
        let mut cur = self.inner.objects.get() as *mut SweepHeader;
        while !cur.is_null() {
            n += 1;
            cur = unsafe { (*cur).link() };
        }
        n
    }

    /// This instance's counters.
    pub fn stats(&self) -> &GcStats {
        &self.inner.stats
    }
}

impl Drop for MarkSweepCollector {
    fn drop(&mut self) {
        context::unbind(NonNull::from(&*self.inner as &dyn Collector));
        // Finalize and free everything still on the list.
        let mut cur = self.inner.objects.get() as *mut SweepHeader;
        while !cur.is_null() {
            let hdr = unsafe { &*cur };
            let next = hdr.link();
            unsafe {
                (hdr.drop)(hdr.body());
                SweepInner::free(cur);
            }
            cur = next;
        }
    }
}

struct SweepInner {
    trigger_threshold: usize,
    auto_threshold: Cell<usize>,
    /// Head of the all-objects list. Marks live in each node's own link
    /// word, never in this head.
    objects: Cell<usize>,
    allocated: Cell<usize>,
    roots: RootList,
    pins: PinList,
    weaks: WeakList,
    stats: GcStats,
    logger: Logger,
}

impl SweepInner {
    fn layout_for(body: usize) -> Layout {
        Layout::from_size_align(SweepHeader::SIZE + body, ALIGN)
            .expect("allocation size overflows a Layout")
    }

    /// Release one header and the body that follows it.
    ///
    /// # Safety
    ///
    /// `hdr` must be off every list and its body already finalized.
    unsafe fn free(hdr: *mut SweepHeader) {
        let layout = Self::layout_for((*hdr).size);
        dealloc(hdr.cast::<u8>(), layout);
    }

    fn alloc_impl(&self, size: usize, trace: TraceFn, drop: DropFn) -> *mut u8 {
        if self.allocated.get() > self.auto_threshold.get() {
            self.run_cycle();
        }
        let body = align_up(size, ALIGN);
        let layout = Self::layout_for(body);
        let raw = unsafe { alloc(layout) };
        if raw.is_null() {
            handle_alloc_error(layout);
        }
        let hdr = raw.cast::<SweepHeader>();
        unsafe {
            hdr.write(SweepHeader {
                next: Cell::new(self.objects.get()),
                size: body,
                trace,
                drop,
            });
        }
        self.objects.set(hdr as usize);
        self.allocated.set(self.allocated.get() + layout.size());
        self.stats.record_allocation(layout.size());
        unsafe { raw.add(SweepHeader::SIZE) }
    }

    /// Mark one reference and recursively its referents. The address
    /// never changes; it is returned so the tracer contract holds.
    fn mark_obj(&self, obj: *mut u8) -> *mut u8 {
        if obj.is_null() {
            return obj;
        }
        let hdr = unsafe { SweepHeader::of_body(obj) };
        if !hdr.is_marked() {
            hdr.next.set(hdr.next.get() | MARK);
            let mut tracer = MarkTracer { gc: self };
            unsafe { (hdr.trace)(obj, &mut tracer) };
        }
        obj
    }

    fn run_cycle(&self) {
        let timer = GcTimer::start();
        let saved_auto = self.auto_threshold.replace(usize::MAX);
        self.weaks.clear();

        // Mark phase: pins are keep-alive roots here, then the root
        // registry, newest first.
        self.pins.for_each(|pin| {
            self.mark_obj(pin.obj.get());
        });
        let mut tracer = MarkTracer { gc: self };
        self.roots.trace_all(&mut tracer);

        // Weak sweep: an unmarked target is about to be freed.
        let mut cleared = 0u64;
        self.weaks.for_each(|node| {
            let hdr = unsafe { SweepHeader::of_body(node.obj.get()) };
            if !hdr.is_marked() {
                node.obj.set(std::ptr::null_mut());
                cleared += 1;
            }
        });

        // Sweep phase: unset survivors, finalize and free the rest.
        let mut freed_bytes = 0usize;
        let mut freed_objects = 0usize;
        let mut slot: &Cell<usize> = &self.objects;
        loop {
            let cur = slot.get() as *mut SweepHeader;
            if cur.is_null() {
                break;
            }
            let hdr = unsafe { &*cur };
            if hdr.is_marked() {
                hdr.next.set(hdr.next.get() & !MARK);
                slot = &hdr.next;
            } else {
                slot.set(hdr.next.get());
                freed_bytes += SweepHeader::SIZE + hdr.size;
                freed_objects += 1;
                unsafe {
                    (hdr.drop)(hdr.body());
                    Self::free(cur);
                }
            }
        }

        self.allocated.set(0);
        self.auto_threshold.set(saved_auto);

        let pause = timer.stop();
        self.stats.record_collection(pause, freed_bytes);
        self.stats.weak_cleared.fetch_add(cleared, Ordering::Relaxed);

        debug!(self.logger, "collection finished";
            "pause_us" => pause.as_micros() as u64,
            "objects_freed" => freed_objects,
            "reclaimed_bytes" => freed_bytes,
            "weak_cleared" => cleared,
        );
    }
}

impl Collector for SweepInner {
    fn alloc_raw(&self, size: usize, trace: TraceFn, drop: DropFn) -> *mut u8 {
        self.alloc_impl(size, trace, drop)
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

struct MarkTracer<'a> {
    gc: &'a SweepInner,
}

impl Tracer for MarkTracer<'_> {
    #[inline]
    fn visit(&mut self, obj: *mut u8) -> *mut u8 {
        self.gc.mark_obj(obj)
    }

    #[inline]
    fn visit_weak(&mut self, node: &mut WeakNode) {
        self.gc.weaks.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::{GcPin, GcWeak, Rooted};

    struct Node {
        value: u64,
        next: GcRef<Node>,
    }

    unsafe impl Trace for Node {
        fn trace(&mut self, tracer: &mut dyn Tracer) {
            self.next.trace(tracer);
        }
    }

    thread_local! {
        static DROPS: Cell<u32> = Cell::new(0);
    }

    struct Tracked {
        _value: u64,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.with(|d| d.set(d.get() + 1));
        }
    }

    unsafe impl Trace for Tracked {
        fn trace(&mut self, _tracer: &mut dyn Tracer) {}
    }

    #[test]
    fn test_alloc_links_objects() {
        let gc = MarkSweepCollector::new(GcConfig::default());

        gc.alloc(Node {
            value: 1,
            next: GcRef::null(),
        });
        gc.alloc(Node {
            value: 2,
            next: GcRef::null(),
        });

        assert_eq!(gc.live_objects(), 2);
    }

    #[test]
    fn test_addresses_stable_across_collections() {
        let gc = MarkSweepCollector::new(GcConfig::default());

        let root = Rooted::new(gc.alloc(Node {
            value: 3,
            next: GcRef::null(),
        }));
        let before = root.as_ptr();

        gc.collect();

        assert_eq!(root.as_ptr(), before);
        assert_eq!(root.value, 3);
    }

    #[test]
    fn test_sweep_finalizes_unreachable() {
        let gc = MarkSweepCollector::new(GcConfig::default());
        DROPS.with(|d| d.set(0));

        gc.alloc(Tracked { _value: 1 });
        gc.alloc(Tracked { _value: 2 });
        let kept = Rooted::new(gc.alloc(Tracked { _value: 3 }));

        gc.collect();

        assert_eq!(DROPS.with(|d| d.get()), 2);
        assert_eq!(gc.live_objects(), 1);
        drop(kept);
    }

    #[test]
    fn test_pin_keeps_object_alive() {
        let gc = MarkSweepCollector::new(GcConfig::default());

        let obj = gc.alloc(Node {
            value: 11,
            next: GcRef::null(),
        });
        let pin = GcPin::new(obj);
        let before = pin.get().as_ptr();

        gc.collect();

        assert_eq!(pin.get().as_ptr(), before);
        assert_eq!(pin.value, 11);
        assert_eq!(gc.live_objects(), 1);
    }

    #[test]
    fn test_weak_semantics() {
        let gc = MarkSweepCollector::new(GcConfig::default());

        let live = Rooted::new(gc.alloc(Node {
            value: 1,
            next: GcRef::null(),
        }));
        let dead = gc.alloc(Node {
            value: 2,
            next: GcRef::null(),
        });

        let weak_live = Rooted::new(GcWeak::new(*live));
        let weak_dead = Rooted::new(GcWeak::new(dead));

        gc.collect();

        assert_eq!(weak_live.get(), *live);
        assert!(weak_dead.is_cleared());
    }

    #[test]
    fn test_collect_twice_is_idempotent() {
        let gc = MarkSweepCollector::new(GcConfig::default());

        let _root = Rooted::new(gc.alloc(Node {
            value: 1,
            next: GcRef::null(),
        }));

        gc.collect();
        let live = gc.live_objects();
        gc.collect();

        assert_eq!(gc.live_objects(), live);
        assert_eq!(gc.total_allocated(), 0);
    }

    #[test]
    fn test_destructor_finalizes_live_objects() {
        DROPS.with(|d| d.set(0));
        {
            let gc = MarkSweepCollector::new(GcConfig::default());
            let _root = Rooted::new(gc.alloc(Tracked { _value: 7 }));
            // _root drops first (unregistering), then the collector
            // finalizes the still-live object.
        }
        assert_eq!(DROPS.with(|d| d.get()), 1);
    }
}
