//! # 请求安全原语
//!
//! 签名令牌、CSRF 双重提交校验与滑动窗口限流

pub mod csrf;
pub mod rate_limit;
pub mod token;

pub use csrf::{CsrfConfig, CsrfGuard};
pub use rate_limit::{
    RateLimitConfig, RateLimitOutcome, RouteRateLimitConfig, RouteRateLimiters,
    SlidingWindowRateLimiter, default_client_key,
};
pub use token::{SignedTokenCodec, issue_token, verify_token};
