//! # 请求安全原语基准测试
//!
//! 限流检查与令牌签发/校验都在每个请求的热路径上。

use criterion::{Criterion, criterion_group, criterion_main};
use request_guard::security::{RateLimitConfig, SignedTokenCodec, SlidingWindowRateLimiter};
use std::hint::black_box;
use std::time::Duration;

const SECRET: &str = "benchmark-secret-0123456789abcdef";

/// 限流检查：单键命中上限与多键分散
fn rate_limiter_benchmark(c: &mut Criterion) {
    let limiter = SlidingWindowRateLimiter::new(&RateLimitConfig::new(100, 60)).unwrap();
    c.bench_function("rate_limit_check_single_key", |b| {
        b.iter(|| limiter.check(black_box("203.0.113.7:/api")));
    });

    let limiter = SlidingWindowRateLimiter::new(&RateLimitConfig::new(100, 60)).unwrap();
    let keys: Vec<String> = (0..1024).map(|i| format!("10.0.{}.{}:/api", i / 256, i % 256)).collect();
    let mut next = 0usize;
    c.bench_function("rate_limit_check_many_keys", |b| {
        b.iter(|| {
            next = (next + 1) % keys.len();
            limiter.check(black_box(&keys[next]))
        });
    });
}

/// 签名令牌签发与校验
fn token_benchmark(c: &mut Criterion) {
    let codec = SignedTokenCodec::new(SECRET).unwrap();
    c.bench_function("token_issue", |b| b.iter(|| codec.issue()));

    let token = codec.issue();
    let max_age = Duration::from_secs(3600);
    c.bench_function("token_verify", |b| {
        b.iter(|| codec.verify(black_box(&token), max_age));
    });
}

criterion_group!(benches, rate_limiter_benchmark, token_benchmark);
criterion_main!(benches);
