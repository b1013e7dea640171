//! Compact two-space copying collection over a fixed-size arena.
//!
//! The collapsed form of the segmented collector: no segments, no pins.
//! Two equal semi-spaces alternate roles; a collection copies the live
//! graph from from-space into to-space and swaps them. A referent belongs
//! to this collector iff its address lies within from-space.
//!
//! The arena never grows. When an allocation does not fit even after a
//! collection, the configured [`OomPolicy`] decides between returning a
//! null reference and panicking with a distinguishable message.

use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use slog::{debug, o, Logger};

use crate::collector::Collector;
use crate::config::{GcConfig, OomPolicy};
use crate::context;
use crate::heap::semispace::Space;
use crate::heap::{align_up, CopyHeader, ALIGN, COPIED};
use crate::refs::GcRef;
use crate::roots::{PinNode, RootList, RootNode, WeakList, WeakNode};
use crate::stats::{GcStats, GcTimer};
use crate::trace::{trace_erased, DropFn, Trace, TraceFn, Tracer};

/// The two-space copying collector.
///
/// One instance per thread; the constructor binds it as the thread's
/// current collector.
pub struct SemiSpaceCollector {
    inner: Box<SemiInner>,
}

impl SemiSpaceCollector {
    /// Create a collector and bind it to the current thread.
    ///
    /// # Panics
    ///
    /// Panics if `config` fails validation.
    pub fn new(config: GcConfig) -> Self {
        Self::with_logger(config, Logger::root(slog::Discard, o!()))
    }

    /// Like [`SemiSpaceCollector::new`], with a logger that receives one
    /// record per finished collection cycle.
    pub fn with_logger(config: GcConfig, logger: Logger) -> Self {
        config.validate().expect("invalid collector configuration");
        let inner = Box::new(SemiInner {
            spaces: [
                Space::new(config.semispace_size),
                Space::new(config.semispace_size),
            ],
            from_idx: Cell::new(0),
            oom: config.oom,
            trigger_threshold: config.trigger_threshold,
            auto_threshold: Cell::new(config.auto_threshold),
            collecting: Cell::new(false),
            allocated: Cell::new(0),
            roots: RootList::new(),
            weaks: WeakList::new(),
            stats: GcStats::new(),
            logger,
        });
        context::bind(NonNull::from(&*inner as &dyn Collector));
        Self { inner }
    }

    /// Allocate `value` in the arena.
    ///
    /// Returns null when the arena is exhausted and the collector was
    /// configured with [`OomPolicy::ReturnNull`].
    pub fn alloc<T: Trace>(&self, value: T) -> GcRef<T> {
        let raw = self
            .inner
            .alloc_impl(std::mem::size_of::<T>(), trace_erased::<T>);
        if raw.is_null() {
            return GcRef::null();
        }
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

    /// Bytes occupied in the active semi-space.
    pub fn live_bytes(&self) -> usize {
        self.inner.from().allocated()
    }

    /// This instance's counters.
    pub fn stats(&self) -> &GcStats {
        &self.inner.stats
    }
}

impl Drop for SemiSpaceCollector {
    fn drop(&mut self) {
        context::unbind(NonNull::from(&*self.inner as &dyn Collector));
        // The arena is released with the spaces; no user finalization.
    }
}

struct SemiInner {
    spaces: [Space; 2],
    /// Index of the active (allocation) space.
    from_idx: Cell<usize>,
    oom: OomPolicy,
    trigger_threshold: usize,
    auto_threshold: Cell<usize>,
    collecting: Cell<bool>,
    allocated: Cell<usize>,
    roots: RootList,
    weaks: WeakList,
    stats: GcStats,
    logger: Logger,
}

impl SemiInner {
    #[inline]
    fn from(&self) -> &Space {
        &self.spaces[self.from_idx.get()]
    }

    #[inline]
    fn to(&self) -> &Space {
        &self.spaces[1 - self.from_idx.get()]
    }

    fn alloc_impl(&self, size: usize, trace: TraceFn) -> *mut u8 {
        if self.allocated.get() > self.auto_threshold.get() {
            self.run_cycle();
        }
        let total = align_up(CopyHeader::SIZE + size, ALIGN);
        let base = match self.from().alloc(total) {
            Some(p) => p,
            None => {
                // Exhausted: collect once, retry, then give up.
                if !self.collecting.get() {
                    self.run_cycle();
                }
                match self.from().alloc(total) {
                    Some(p) => p,
                    None => {
                        return match self.oom {
                            OomPolicy::ReturnNull => std::ptr::null_mut(),
                            OomPolicy::Panic => panic!(
                                "semi-space exhausted: {} bytes requested, {} free",
                                total,
                                self.from().free()
                            ),
                        }
                    }
                }
            }
        };

        let body_size = total - CopyHeader::SIZE;
        unsafe {
            base.as_ptr().cast::<CopyHeader>().write(CopyHeader {
                word: Cell::new(0),
                size: body_size,
                trace,
            });
        }
        self.allocated.set(self.allocated.get() + total);
        self.stats.record_allocation(total);
        unsafe { base.as_ptr().add(CopyHeader::SIZE) }
    }

    fn copy_obj(&self, obj: *mut u8) -> *mut u8 {
        if obj.is_null() {
            return obj;
        }
        if !self.from().contains(obj) {
            // Foreign object, or a reference already rewritten into
            // to-space.
            return obj;
        }
        let hdr = unsafe { CopyHeader::of_body(obj) };
        let word = hdr.word.get();
        if word & COPIED != 0 {
            return hdr.forwarded();
        }

        let size = hdr.size;
        let total = CopyHeader::SIZE + size;
        let base = self
            .to()
            .alloc(total)
            .expect("to-space overflow during collection");
        let dest = unsafe { base.as_ptr().add(CopyHeader::SIZE) };
        unsafe {
            base.as_ptr().cast::<CopyHeader>().write(CopyHeader {
                word: Cell::new(0),
                size,
                trace: hdr.trace,
            });
        }
        hdr.word.set(dest as usize | COPIED);
        unsafe {
            std::ptr::copy_nonoverlapping(obj, dest, size);
            let mut tracer = SemiTracer { gc: self };
            (hdr.trace)(dest, &mut tracer);
        }
        self.stats.bytes_copied.fetch_add(size as u64, Ordering::Relaxed);
        dest
    }

    fn run_cycle(&self) {
        let timer = GcTimer::start();
        let saved_auto = self.auto_threshold.replace(usize::MAX);
        self.collecting.set(true);
        let before = self.from().allocated();
        self.weaks.clear();

        // Root trace copies the live graph into to-space.
        let mut tracer = SemiTracer { gc: self };
        self.roots.trace_all(&mut tracer);

        // Weak sweep: anything still addressed in from-space is dead.
        let mut cleared = 0u64;
        let mut retargeted = 0u64;
        self.weaks.for_each(|node| {
            let obj = node.obj.get();
            if !self.from().contains(obj) {
                return;
            }
            let hdr = unsafe { CopyHeader::of_body(obj) };
            let word = hdr.word.get();
            if word & COPIED != 0 {
                node.obj.set(hdr.forwarded());
                retargeted += 1;
            } else {
                node.obj.set(std::ptr::null_mut());
                cleared += 1;
            }
        });

        // Flip: to-space becomes the active space, the old from-space is
        // rewound for the next cycle.
        self.from_idx.set(1 - self.from_idx.get());
        self.to().reset();

        let live = self.from().allocated();
        self.allocated.set(0);
        self.collecting.set(false);
        self.auto_threshold.set(saved_auto);

        let pause = timer.stop();
        let freed = before.saturating_sub(live);
        self.stats.record_collection(pause, freed);
        self.stats.weak_cleared.fetch_add(cleared, Ordering::Relaxed);
        self.stats
            .weak_retargeted
            .fetch_add(retargeted, Ordering::Relaxed);

        debug!(self.logger, "collection finished";
            "pause_us" => pause.as_micros() as u64,
            "live_bytes" => live,
            "reclaimed_bytes" => freed,
            "weak_cleared" => cleared,
            "weak_retargeted" => retargeted,
        );
    }
}

impl Collector for SemiInner {
    fn alloc_raw(&self, size: usize, trace: TraceFn, _drop: DropFn) -> *mut u8 {
        self.alloc_impl(size, trace)
    }

    fn register_root(&self, node: NonNull<RootNode>) {
        self.roots.register(node);
    }

    fn unregister_root(&self, node: NonNull<RootNode>) {
        self.roots.unregister(node);
    }

    fn register_pin(&self, _node: NonNull<PinNode>) {
        panic!("pinning is not supported by the two-space collector");
    }

    fn unregister_pin(&self, _node: NonNull<PinNode>) {
        panic!("pinning is not supported by the two-space collector");
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

struct SemiTracer<'a> {
    gc: &'a SemiInner,
}

impl Tracer for SemiTracer<'_> {
    #[inline]
    fn visit(&mut self, obj: *mut u8) -> *mut u8 {
        self.gc.copy_obj(obj)
    }

    #[inline]
    fn visit_weak(&mut self, node: &mut WeakNode) {
        self.gc.weaks.push(node);
    }
}
