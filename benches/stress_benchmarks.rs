use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

use esb_stress::client::StatisticsAggregator;
use esb_stress::config::HeaderConfig;
use esb_stress::core::dispatcher::validate_headers;
use esb_stress::headers::{HeaderFactory, HeaderPolicy};

use hyper::HeaderMap;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn policy(broken: u8, invalid: u8) -> Arc<HeaderPolicy> {
    let config = HeaderConfig {
        broken_headers_percent: broken,
        invalid_headers_percent: invalid,
        ..HeaderConfig::default()
    };
    Arc::new(HeaderPolicy::from_config(&config).unwrap())
}

fn bench_header_factory(c: &mut Criterion) {
    let mut group = c.benchmark_group("header_factory");
    let base = HeaderMap::new();

    for (broken, invalid) in [(0u8, 0u8), (10, 10), (50, 50)] {
        let factory = HeaderFactory::new(policy(broken, invalid));
        let mut rng = StdRng::seed_from_u64(42);
        group.bench_with_input(
            BenchmarkId::new("build", format!("{}_{}", broken, invalid)),
            &factory,
            |b, factory| b.iter(|| black_box(factory.build(&base, &mut rng))),
        );
    }

    group.finish();
}

fn bench_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");
    group.throughput(Throughput::Elements(1));

    let stats = StatisticsAggregator::new();
    let mut i = 0u64;
    group.bench_function("record_request", |b| {
        b.iter(|| {
            i += 1;
            stats.record_request(i % 10 != 0, black_box(Duration::from_micros(i % 5000)));
        })
    });

    group.bench_function("summary", |b| b.iter(|| black_box(stats.summary())));

    group.finish();
}

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");
    let policy = policy(0, 0);
    let headers = HeaderFactory::new(policy.clone()).build(&HeaderMap::new(), &mut StdRng::seed_from_u64(7));

    for authenticate in [false, true] {
        group.bench_with_input(
            BenchmarkId::new("validate_headers", authenticate),
            &authenticate,
            |b, &authenticate| b.iter(|| validate_headers(black_box(&headers), &policy, authenticate)),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_header_factory, bench_statistics, bench_validation);
criterion_main!(benches);
