//! Allocation path benchmarks.
//!
//! Measures allocate/free pairs served from the free lists, the extension
//! path, and a small reallocate churn.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use segalloc::{Arena, SegregatedAllocator};

fn warm_allocator() -> SegregatedAllocator<Arena> {
  let mut allocator =
    SegregatedAllocator::init(Arena::new(Arena::DEFAULT_CAPACITY).unwrap()).unwrap();
  let warm = allocator.allocate(1 << 16).unwrap();
  let _fence = allocator.allocate(16).unwrap();
  unsafe { allocator.free(warm) };
  allocator
}

fn bench_allocate_free(c: &mut Criterion) {
  let mut group = c.benchmark_group("allocate_free");
  for size in [16usize, 100, 1000, 10_000] {
    let mut allocator = warm_allocator();
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
      b.iter(|| {
        let ptr = allocator.allocate(criterion::black_box(size)).unwrap();
        unsafe { allocator.free(ptr) };
      });
    });
  }
  group.finish();
}

fn bench_fragmented_fit(c: &mut Criterion) {
  let mut allocator = warm_allocator();
  let ptrs: Vec<_> = (0..256).map(|i| allocator.allocate(32 + (i % 7) * 16).unwrap()).collect();
  for ptr in ptrs.iter().step_by(2) {
    unsafe { allocator.free(*ptr) };
  }

  c.bench_function("fragmented_fit", |b| {
    b.iter(|| {
      let ptr = allocator.allocate(criterion::black_box(72)).unwrap();
      unsafe { allocator.free(ptr) };
    });
  });
}

fn bench_extend(c: &mut Criterion) {
  c.bench_function("extend_heap", |b| {
    b.iter_with_setup(
      || SegregatedAllocator::init(Arena::new(1 << 16).unwrap()).unwrap(),
      |mut allocator| {
        for _ in 0..8 {
          criterion::black_box(allocator.allocate(4000).unwrap());
        }
      },
    );
  });
}

fn bench_reallocate(c: &mut Criterion) {
  let mut allocator = warm_allocator();
  c.bench_function("reallocate_grow_shrink", |b| {
    b.iter(|| unsafe {
      let ptr = allocator.allocate(64).unwrap();
      let ptr = allocator.reallocate(ptr, 512).unwrap();
      let ptr = allocator.reallocate(ptr, 32).unwrap();
      allocator.free(ptr);
    });
  });
}

criterion_group!(
  benches,
  bench_allocate_free,
  bench_fragmented_fit,
  bench_extend,
  bench_reallocate
);
criterion_main!(benches);
