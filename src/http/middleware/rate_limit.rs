//! # 限流中间件
//!
//! 按路径前缀匹配限流规则；命中的每个响应都带上 `X-RateLimit-*` 头，
//! 拒绝时返回 429 并附 `Retry-After`。

use super::request_id::request_id_of;
use crate::error::GuardError;
use crate::http::server::AppState;
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;
use crate::security::RateLimitOutcome;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// 写入限流响应头，`X-RateLimit-Reset` 为 epoch 秒
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, outcome: &RateLimitOutcome) {
    headers.insert(HEADER_LIMIT, HeaderValue::from(outcome.limit));
    headers.insert(HEADER_REMAINING, HeaderValue::from(outcome.remaining));
    headers.insert(HEADER_RESET, HeaderValue::from(outcome.reset_at_secs()));
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(check) = state
        .rate_limiters
        .check(request.headers(), request.uri().path())
    else {
        return next.run(request).await;
    };

    if !check.outcome.allowed {
        lwarn!(
            request_id_of(&request),
            LogStage::RateLimit,
            LogComponent::RateLimiter,
            "rate_limited",
            "request rejected by rate limiter",
            key = %check.key,
            prefix = %check.prefix,
            path = %request.uri().path()
        );
        let mut response = GuardError::RateLimitExceeded {
            limit: check.outcome.limit,
            reset_at_ms: check.outcome.reset_at_ms,
            retry_after_secs: check.outcome.retry_after_secs(check.now_ms),
        }
        .into_response();
        apply_rate_limit_headers(response.headers_mut(), &check.outcome);
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &check.outcome);
    response
}
