//! Performance benchmarks for the request pipeline bookkeeping
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio_util::sync::CancellationToken;

use delijn_client::common::{CircuitBreaker, RateLimiter};

fn benchmark_rate_limiter(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cancel = CancellationToken::new();

    // Refill fast enough that acquire never has to wait
    let limiter = RateLimiter::with_rate(1_000_000_000, Duration::from_secs(1));
    c.bench_function("rate_limiter_acquire", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(limiter.acquire(&cancel).await) })
    });
}

fn benchmark_circuit_breaker(c: &mut Criterion) {
    let mut breaker = CircuitBreaker::with_defaults();
    c.bench_function("circuit_breaker_check_and_record", |b| {
        b.iter(|| {
            let open = breaker.is_open();
            breaker.record_failure();
            breaker.record_success();
            black_box(open)
        })
    });
}

criterion_group!(benches, benchmark_rate_limiter, benchmark_circuit_breaker);
criterion_main!(benches);
