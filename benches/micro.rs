//! Micro-benchmarks for chunkstore core operations.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- append    # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chunkstore::data_kind::KvEntry;
use chunkstore::engine::{Engine, EngineConfig};
use tempfile::TempDir;

/// Default value payload for benchmarks (128 bytes).
const VALUE_128B: &[u8; 128] = &[0xAB; 128];

/// Larger value payload (1 KiB).
const VALUE_1K: &[u8; 1024] = &[0xCD; 1024];

fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

/// A WAL large enough that nothing rotates during the benchmark — isolates
/// the append/find path from SST construction.
fn open_no_rotation(dir: &std::path::Path) -> Engine<KvEntry> {
    Engine::open(
        dir,
        EngineConfig {
            wal_max_size: 256 * 1024 * 1024,
            max_chunk_values: 256,
        },
    )
    .expect("open")
}

/// Pre-populates `count` sequential keys, forces a flush, and returns the
/// engine with everything living in SSTs.
fn prepopulate_flushed(dir: &std::path::Path, count: u64, value: &[u8]) -> Engine<KvEntry> {
    let mut engine = open_no_rotation(dir);
    for i in 0..count {
        engine.append(KvEntry::upsert(make_key(i), value.to_vec(), i as i128)).unwrap();
    }
    engine.flush().unwrap();
    engine
}

/// ## `memtable_only/128B` and `memtable_only/1K`
///
/// Appends into a WAL sized so it never rotates during the run, isolating
/// the side-journal write plus in-memory chunk append cost from SST
/// construction. Two payload sizes show how append latency scales with
/// value size.
///
/// ## `with_rotation`
///
/// Appends with a small `wal_max_size`, so rotation (WAL → SST) happens
/// repeatedly during the run. Reflects sustained write throughput including
/// the amortized cost of building SSTs.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for &(label, value) in &[("128B", VALUE_128B.as_slice()), ("1K", VALUE_1K.as_slice())] {
        group.bench_function(BenchmarkId::new("memtable_only", label), |b| {
            let dir = TempDir::new().unwrap();
            let mut engine = open_no_rotation(dir.path());
            let mut seq = 0u64;

            b.iter(|| {
                let key = make_key(seq);
                engine
                    .append(KvEntry::upsert(black_box(key), black_box(value.to_vec()), seq as i128))
                    .unwrap();
                seq += 1;
            });
        });
    }

    group.bench_function("with_rotation", |b| {
        let dir = TempDir::new().unwrap();
        let mut engine: Engine<KvEntry> = Engine::open(
            dir.path(),
            EngineConfig {
                wal_max_size: 16 * 1024,
                max_chunk_values: 32,
            },
        )
        .unwrap();
        let mut seq = 0u64;

        b.iter(|| {
            let key = make_key(seq);
            engine
                .append(KvEntry::upsert(black_box(key), black_box(VALUE_128B.to_vec()), seq as i128))
                .unwrap();
            seq += 1;
        });
    });

    group.finish();
}

/// ## `wal_hit` / `wal_miss`
///
/// Reads against 10,000 keys held entirely in the WAL's in-memory chunks
/// (no rotation). Measures the in-memory scan-and-compare path in
/// [`chunkstore::wal::Wal::find`].
///
/// ## `sst_hit` / `sst_miss`
///
/// Reads against 5,000 keys flushed into an SST, with the engine reopened
/// so the WAL is empty. Measures the full on-disk path: aggregate-range
/// check, sparse-index binary search, demand chunk decode, in-chunk binary
/// search.
fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");

    {
        let dir = TempDir::new().unwrap();
        let mut engine = open_no_rotation(dir.path());
        let n = 10_000u64;
        for i in 0..n {
            engine.append(KvEntry::upsert(make_key(i), VALUE_128B.to_vec(), i as i128)).unwrap();
        }

        group.bench_function("wal_hit", |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = make_key(i % n);
                let _ = black_box(engine.find(black_box(&key)).unwrap());
                i += 1;
            });
        });

        group.bench_function("wal_miss", |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = make_key(n + i);
                let _ = black_box(engine.find(black_box(&key)).unwrap());
                i += 1;
            });
        });
    }

    {
        let dir = TempDir::new().unwrap();
        let n = 5_000u64;
        let engine = prepopulate_flushed(dir.path(), n, VALUE_128B);

        group.bench_function("sst_hit", |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = make_key(i % n);
                let _ = black_box(engine.find(black_box(&key)).unwrap());
                i += 1;
            });
        });

        group.bench_function("sst_miss", |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = make_key(n + i);
                let _ = black_box(engine.find(black_box(&key)).unwrap());
                i += 1;
            });
        });
    }

    group.finish();
}

/// ## `flush/{1000,5000}`
///
/// Prepopulates N keys into the WAL (large enough to hold all of them)
/// then measures the cost of a single `flush` call: serializing every
/// chunk, deduping/regrouping by key, and writing the descending-packed
/// SST file.
fn bench_rotation(c: &mut Criterion) {
    let mut group = c.benchmark_group("rotation");
    group.sample_size(10);

    for &count in &[1_000u64, 5_000] {
        group.bench_function(BenchmarkId::new("flush", count), |b| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let mut engine = open_no_rotation(dir.path());
                    for i in 0..count {
                        engine.append(KvEntry::upsert(make_key(i), VALUE_128B.to_vec(), i as i128)).unwrap();
                    }
                    (dir, engine)
                },
                |(_dir, mut engine)| {
                    engine.flush().unwrap();
                    black_box(&engine);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// ## `pairwise/{1000,5000}`
///
/// Builds two same-sized SSTs with disjoint key ranges and measures
/// `compact` latency: reading both via `iter_records`, merging by key, and
/// writing the result as a new SST.
fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");
    group.sample_size(10);

    for &count in &[1_000u64, 5_000] {
        group.bench_function(BenchmarkId::new("pairwise", count), |b| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let mut engine = open_no_rotation(dir.path());
                    for i in 0..count {
                        engine.append(KvEntry::upsert(make_key(i), VALUE_128B.to_vec(), i as i128)).unwrap();
                    }
                    engine.flush().unwrap();
                    for i in count..count * 2 {
                        engine.append(KvEntry::upsert(make_key(i), VALUE_128B.to_vec(), i as i128)).unwrap();
                    }
                    engine.flush().unwrap();

                    let ids: Vec<u64> = std::fs::read_dir(dir.path())
                        .unwrap()
                        .map(|e| e.unwrap().path())
                        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("sst"))
                        .map(|p| p.file_stem().unwrap().to_str().unwrap().parse().unwrap())
                        .collect();
                    (dir, engine, ids)
                },
                |(_dir, mut engine, ids)| {
                    engine.compact(ids[0], ids[1]).unwrap();
                    black_box(&engine);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// ## `open_existing/{1000,10000}`
///
/// Prepopulates N keys, flushes, and measures cold-open latency: the
/// directory scan plus every `.sst`'s header/index read.
fn bench_recovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery");
    group.sample_size(10);

    for &count in &[1_000u64, 10_000] {
        group.bench_function(BenchmarkId::new("open_existing", count), |b| {
            let dir = TempDir::new().unwrap();
            {
                let mut engine = open_no_rotation(dir.path());
                for i in 0..count {
                    engine.append(KvEntry::upsert(make_key(i), VALUE_128B.to_vec(), i as i128)).unwrap();
                }
                engine.flush().unwrap();
            }

            let cfg = EngineConfig {
                wal_max_size: 256 * 1024 * 1024,
                max_chunk_values: 256,
            };
            b.iter(|| {
                let engine: Engine<KvEntry> = Engine::open(dir.path(), cfg).unwrap();
                black_box(&engine);
            });
        });
    }

    group.finish();
}

/// ## `append/{64B,256B,1K,4K}`
///
/// Appends a single key with the given value size into a WAL that never
/// rotates. `Throughput::Bytes` enables bytes/second reporting.
fn bench_value_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_size");

    let sizes: &[(&str, usize)] = &[("64B", 64), ("256B", 256), ("1K", 1024), ("4K", 4096)];

    for &(label, size) in sizes {
        let value = vec![0xEF_u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::new("append", label), |b| {
            let dir = TempDir::new().unwrap();
            let mut engine = open_no_rotation(dir.path());
            let mut seq = 0u64;
            b.iter(|| {
                let key = make_key(seq);
                engine
                    .append(KvEntry::upsert(black_box(key), black_box(value.clone()), seq as i128))
                    .unwrap();
                seq += 1;
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_append,
    bench_find,
    bench_rotation,
    bench_compaction,
    bench_recovery,
    bench_value_sizes,
);

criterion_main!(benches);
