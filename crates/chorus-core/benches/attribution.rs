use chorus_core::attribution::{compute_char_attribution, merge_attribution};
use chorus_core::commit::CommitHash;
use chorus_core::model::DocumentHistoryEntry;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

const SIZES: &[usize] = &[256, 1_024, 4_096];

fn revision(len: usize, salt: usize) -> String {
    (0..len)
        .map(|i| {
            if (i + salt) % 97 == 0 {
                '\n'
            } else {
                char::from(b'a' + u8::try_from((i * 7 + salt) % 26).unwrap_or(0))
            }
        })
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("attribution.merge");

    for &size in SIZES {
        let previous = compute_char_attribution(&[DocumentHistoryEntry {
            commit_hash: CommitHash::parse(&"0".repeat(64)).expect("valid hash"),
            user: "alice".into(),
            content: revision(size, 0),
            timestamp_ms: 0,
        }]);
        let next: Vec<char> = revision(size, 3).chars().collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(merge_attribution(&previous, &next, "bob").len()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge);
criterion_main!(benches);
