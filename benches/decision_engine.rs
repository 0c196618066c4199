use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use abuse_guard::{
    AbuseDecisionEngine, BudgetLimits, CircuitBreakerConfig, DeniedAction, FailurePolicy,
    InMemoryStore, RateLimitContext, ResourcePolicy, ScoreThresholds, SystemClock,
};

fn build_engine() -> AbuseDecisionEngine<Arc<InMemoryStore>> {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(SystemClock::new());

    AbuseDecisionEngine::builder(store, clock)
        .with_thresholds(ScoreThresholds::new(50, 100).unwrap())
        .with_budget_limits(BudgetLimits::new(1_000_000, 1_000_000, 1_000_000))
        .with_breaker_config(
            CircuitBreakerConfig::new(5, Duration::from_secs(300), Duration::from_secs(60))
                .unwrap(),
        )
        .with_default_policy(ResourcePolicy {
            denied_action: DeniedAction::Throttle,
            on_store_failure: FailurePolicy::FailOpen,
        })
        .build()
        .unwrap()
}

fn simple_context() -> RateLimitContext {
    RateLimitContext::new("192.0.2.17".parse().unwrap(), "bench-agent/1.0")
}

fn full_context() -> RateLimitContext {
    let fingerprint = BTreeMap::from([
        ("canvas".to_string(), "a1b2c3d4".to_string()),
        ("webgl".to_string(), "e5f6a7b8".to_string()),
        ("fonts".to_string(), "12ab34cd".to_string()),
    ]);

    RateLimitContext::new("192.0.2.17".parse().unwrap(), "bench-agent/1.0")
        .with_account_id("42")
        .with_session_device_id("device-7")
        .with_session_trusted(true)
        .with_client_fingerprint(fingerprint)
}

/// Benchmark limiter-key derivation
fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_derivation");

    let simple = simple_context();
    group.bench_function("ip_only", |b| b.iter(|| black_box(&simple).limiter_keys()));

    let full = full_context();
    group.bench_function("all_scopes", |b| b.iter(|| black_box(&full).limiter_keys()));

    group.finish();
}

/// Benchmark the decide hot path against a warm in-memory store
fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("decide");
    group.throughput(Throughput::Elements(1));

    let engine = build_engine();
    let ctx = full_context();

    // Warm the budget records so decide reads existing keys
    engine.record_success(&ctx, "login").unwrap();

    group.bench_function("clean_allow", |b| {
        b.iter(|| engine.decide(black_box(&ctx), black_box("login"), black_box(0)))
    });

    group.bench_function("score_challenge", |b| {
        b.iter(|| engine.decide(black_box(&ctx), black_box("login"), black_box(60)))
    });

    group.finish();
}

/// Benchmark the post-operation write path
fn bench_record_outcome(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_outcome");
    group.throughput(Throughput::Elements(1));

    let engine = build_engine();
    let ctx = full_context();

    group.bench_function("record_success", |b| {
        b.iter(|| engine.record_success(black_box(&ctx), black_box("login")).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_decide,
    bench_record_outcome
);
criterion_main!(benches);
