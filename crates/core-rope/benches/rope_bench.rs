use core_rope::{Arena, Rope};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn seed_text(lines: usize) -> String {
    let mut s = String::new();
    for i in 0..lines {
        s.push_str(&format!("line {i} with some representative width\n"));
    }
    s
}

fn bench_insert_middle(c: &mut Criterion) {
    let seed = seed_text(2000);
    c.bench_function("insert_middle_1b", |b| {
        b.iter_batched(
            || Rope::from_str(&seed),
            |mut rope| {
                let mid = rope.len() / 2;
                rope.insert(mid, b"x").unwrap();
                black_box(rope.len())
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_line_range(c: &mut Criterion) {
    let rope = Rope::from_str(&seed_text(2000));
    c.bench_function("line_range_mid", |b| {
        b.iter(|| black_box(rope.line_range(black_box(1000)).unwrap()))
    });
}

fn bench_slice_spanning(c: &mut Criterion) {
    let mut rope = Rope::from_str(&seed_text(100));
    for i in 0..64 {
        rope.insert((i * 37) % rope.len(), b"frag").unwrap();
    }
    c.bench_function("slice_spanning_pieces", |b| {
        b.iter(|| {
            let arena = Arena::new();
            let s = rope.slice(10..rope.len() - 10, &arena).unwrap();
            black_box(s.len())
        })
    });
}

fn bench_snapshot_restore(c: &mut Criterion) {
    let mut rope = Rope::from_str(&seed_text(500));
    for i in 0..128 {
        rope.insert((i * 53) % rope.len(), b"edit").unwrap();
    }
    c.bench_function("snapshot_restore", |b| {
        b.iter(|| {
            let snap = rope.snapshot();
            rope.restore(black_box(&snap));
        })
    });
}

criterion_group!(
    benches,
    bench_insert_middle,
    bench_line_range,
    bench_slice_spanning,
    bench_snapshot_restore
);
criterion_main!(benches);
