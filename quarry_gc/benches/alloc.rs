//! Allocator micro-benchmark.
//!
//! Churns a fixed window of live objects through each back-end: every
//! iteration allocates one object and drops the oldest, so the live set
//! stays constant while garbage accumulates and cycles run under the
//! configured thresholds.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use quarry_gc::{
    alloc, rooted_vec, CopyingCollector, GcConfig, GcRef, MarkSweepCollector, SemiSpaceCollector,
    Trace, Tracer,
};

const LIVE_WINDOW: usize = 1024;
const OBJECT_WORDS: usize = 10;

struct Blob {
    data: [u64; OBJECT_WORDS],
}

unsafe impl Trace for Blob {
    fn trace(&mut self, _tracer: &mut dyn Tracer) {}
}

fn churn_config() -> GcConfig {
    GcConfig {
        segment_size: 1024 * 1024,
        semispace_size: 1024 * 1024,
        auto_threshold: 4 * 1024 * 1024,
        verify_heap: false,
        ..Default::default()
    }
}

fn bench_alloc_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_churn");
    group.throughput(Throughput::Bytes(
        (OBJECT_WORDS * std::mem::size_of::<u64>()) as u64,
    ));

    group.bench_function("segmented_copying", |b| {
        let _gc = CopyingCollector::new(churn_config());
        let mut window = rooted_vec::<Blob>();
        window.resize(LIVE_WINDOW, GcRef::null());
        let mut i = 0usize;
        b.iter(|| {
            window[i % LIVE_WINDOW] = alloc(Blob {
                data: [i as u64; OBJECT_WORDS],
            });
            i += 1;
            black_box(&window[i % LIVE_WINDOW]);
        });
    });

    group.bench_function("two_space", |b| {
        let _gc = SemiSpaceCollector::new(churn_config());
        let mut window = rooted_vec::<Blob>();
        window.resize(LIVE_WINDOW, GcRef::null());
        let mut i = 0usize;
        b.iter(|| {
            window[i % LIVE_WINDOW] = alloc(Blob {
                data: [i as u64; OBJECT_WORDS],
            });
            i += 1;
            black_box(&window[i % LIVE_WINDOW]);
        });
    });

    group.bench_function("mark_sweep", |b| {
        let _gc = MarkSweepCollector::new(churn_config());
        let mut window = rooted_vec::<Blob>();
        window.resize(LIVE_WINDOW, GcRef::null());
        let mut i = 0usize;
        b.iter(|| {
            window[i % LIVE_WINDOW] = alloc(Blob {
                data: [i as u64; OBJECT_WORDS],
            });
            i += 1;
            black_box(&window[i % LIVE_WINDOW]);
        });
    });

    group.finish();
}

criterion_group!(alloc_benches, bench_alloc_churn);
criterion_main!(alloc_benches);
