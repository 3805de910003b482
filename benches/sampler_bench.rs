use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use hostpulse::system::process::{ProcessEnumerator, RankingPolicy, rank_by_memory};
use hostpulse::system::source::{ProcessCounters, ScriptedSource};
use hostpulse::system::stats::ProcessInfo;
use std::hint::black_box;

fn make_processes(n: usize) -> Vec<ProcessInfo> {
    (0..n)
        .map(|i| ProcessInfo {
            pid: i as u32 + 1,
            name: format!("proc_{i}"),
            state: "S".to_string(),
            cpu: (i % 100) as f64,
            memory: ((i * 7919) % n) as u64 * 1024,
            threads: 1,
        })
        .collect()
}

fn make_source(n: usize) -> ScriptedSource {
    (0..n).fold(ScriptedSource::new(), |source, i| {
        let pid = i as u32 + 1;
        if i % 10 == 9 {
            return source.with_vanished_process(pid);
        }
        source.with_process(
            pid,
            ProcessCounters {
                name: Some(format!("proc_{i}")),
                state: Some("S".to_string()),
                resident_bytes: Some(((i * 7919) % n) as u64 * 1024),
                threads: Some(1),
                ..ProcessCounters::default()
            },
        )
    })
}

fn bench_rank_by_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_by_memory_500_1000_2000");
    for size in [500usize, 1000, 2000] {
        let processes = make_processes(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &processes, |b, procs| {
            b.iter(|| rank_by_memory(black_box(procs.clone())))
        });
    }
    group.finish();
}

fn bench_enumerate(c: &mut Criterion) {
    let mut group = c.benchmark_group("enumerate_500_1000_2000");
    for size in [500usize, 1000, 2000] {
        let source = make_source(size);
        for policy in [RankingPolicy::ResidentMemory, RankingPolicy::EnumerationOrder] {
            let enumerator = ProcessEnumerator::new(policy);
            group.bench_with_input(
                BenchmarkId::new(format!("{policy:?}"), size),
                &source,
                |b, source| b.iter(|| enumerator.sample(black_box(source))),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_rank_by_memory, bench_enumerate);
criterion_main!(benches);
