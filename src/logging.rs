//! # 日志配置模块
//!
//! 基于 `tracing` 的结构化日志：统一的阶段、组件字段，以及 `linfo!` 等便捷宏。
//! 安全相关的拒绝只记录键或路径，从不记录令牌本身。

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 日志所处的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Startup,
    Shutdown,
    Configuration,
    Authentication,
    CsrfCheck,
    RateLimit,
    OAuthStart,
    OAuthCallback,
    ExternalApi,
    Db,
    Cache,
    BackgroundTask,
    Response,
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Configuration => "configuration",
            Self::Authentication => "authentication",
            Self::CsrfCheck => "csrf_check",
            Self::RateLimit => "rate_limit",
            Self::OAuthStart => "oauth_start",
            Self::OAuthCallback => "oauth_callback",
            Self::ExternalApi => "external_api",
            Self::Db => "db",
            Self::Cache => "cache",
            Self::BackgroundTask => "background_task",
            Self::Response => "response",
        };
        f.write_str(name)
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    Main,
    Config,
    ServerSetup,
    Scheduler,
    Token,
    Csrf,
    RateLimiter,
    Session,
    OAuth,
    ExchangeStore,
    Database,
    Redis,
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::ServerSetup => "server_setup",
            Self::Scheduler => "scheduler",
            Self::Token => "token",
            Self::Csrf => "csrf",
            Self::RateLimiter => "rate_limiter",
            Self::Session => "session",
            Self::OAuth => "oauth",
            Self::ExchangeStore => "exchange_store",
            Self::Database => "database",
            Self::Redis => "redis",
        };
        f.write_str(name)
    }
}

/// 结构化 info 日志
///
/// `linfo!(request_id, stage, component, operation, message, field = value, ...)`
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($fields:tt)+)?) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 结构化 warn 日志
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($fields:tt)+)?) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 结构化 error 日志
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($fields:tt)+)?) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 结构化 debug 日志
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($fields:tt)+)?) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 默认过滤规则：压低数据库查询日志
fn default_filter(level: &str) -> String {
    format!("{level},request_guard=debug,sqlx::query=off,sea_orm::query=warn,sqlx=warn")
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先；否则使用传入级别（默认 info）。重复初始化时静默忽略。
pub fn init_logging(log_level: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| default_filter(level));

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}
