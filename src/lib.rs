//! # Request Guard
//!
//! Web 服务的请求安全核心：签名 CSRF 令牌、滑动窗口限流、一次性交换存储、
//! 带滑动续期的会话认证，以及 OAuth2 授权码 + PKCE 流程。

pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod http;
pub mod logging;
pub mod security;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{GuardError, Result};
