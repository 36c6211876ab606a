use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use futures::future::join_all;
use resilience_lab::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryExecutor,
};
use resilience_lab::config::ClientConfig;
use resilience_lab::error::Error;
use std::collections::HashMap;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn benchmark_backoff_delay(c: &mut Criterion) {
    let executor = RetryExecutor::new(RetryConfig::default());

    c.bench_function("retry/backoff_delay", |b| {
        b.iter(|| black_box(executor.backoff_delay(black_box(4))))
    });
}

fn benchmark_breaker_closed(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::new("http://bench/data", CircuitBreakerConfig::default());

    c.bench_function("breaker/closed_success", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(breaker.call(|| async { Ok::<_, Error>(1u32) }).await)
        });
    });
}

fn benchmark_breaker_open(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::new(
        "http://bench/data",
        CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout_ms: u64::MAX / 2,
            call_timeout_ms: None,
        },
    );
    rt.block_on(async {
        let _ = breaker
            .call(|| async { Err::<u32, _>(Error::Network("down".to_string())) })
            .await;
    });

    c.bench_function("breaker/open_fail_fast", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(breaker.call(|| async { Ok::<_, Error>(1u32) }).await)
        });
    });
}

fn benchmark_breaker_concurrency(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::new("http://bench/data", CircuitBreakerConfig::default());
    let mut group = c.benchmark_group("breaker_concurrency");

    for callers in [1usize, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(callers), callers, |b, &n| {
            b.to_async(&rt).iter(|| async {
                let calls = (0..n).map(|_| breaker.call(|| async { Ok::<_, Error>(()) }));
                black_box(join_all(calls).await)
            });
        });
    }
    group.finish();
}

fn benchmark_config_loading(c: &mut Criterion) {
    let vars: HashMap<String, String> = [
        ("BACKEND_HOST", "localhost"),
        ("BACKEND_PORT", "5001"),
        ("TIMEOUT_MS", "3000"),
        ("MAX_RETRIES", "5"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    c.bench_function("config_loading", |b| {
        b.iter(|| black_box(ClientConfig::from_vars(vars.clone())))
    });
}

criterion_group!(
    benches,
    benchmark_backoff_delay,
    benchmark_breaker_closed,
    benchmark_breaker_open,
    benchmark_breaker_concurrency,
    benchmark_config_loading
);
criterion_main!(benches);
