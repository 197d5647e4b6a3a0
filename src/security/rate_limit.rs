//! # 滑动窗口限流
//!
//! 每个键只保留严格晚于 `now - window` 的请求时间戳，保留数小于上限时放行并记录本次。
//! `status` 只读，不占用配额。空窗口由后台清理任务回收。

use crate::ensure_config;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::store::{MemoryWindowStore, WindowSnapshot, WindowStore};
use crate::utils::clock::{SharedClock, SystemClock, duration_ms};
use crate::{ldebug, linfo};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 无法识别客户端地址时使用的键
pub const UNKNOWN_CLIENT: &str = "unknown";

/// 限流参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 窗口内允许的最大请求数
    pub max_requests: u32,
    /// 窗口长度（秒）
    pub window_secs: u64,
    /// 清理间隔（秒），缺省与窗口相同
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_interval_secs: Option<u64>,
}

impl RateLimitConfig {
    #[must_use]
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
            cleanup_interval_secs: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_config!(
            self.max_requests > 0,
            "rate limit max_requests must be greater than 0"
        );
        ensure_config!(
            self.window_secs > 0,
            "rate limit window_secs must be greater than 0"
        );
        ensure_config!(
            self.cleanup_interval_secs != Some(0),
            "rate limit cleanup_interval_secs must be greater than 0"
        );
        Ok(())
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.unwrap_or(self.window_secs))
    }
}

/// 按路径前缀配置的限流规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRateLimitConfig {
    pub prefix: String,
    #[serde(flatten)]
    pub limit: RateLimitConfig,
}

impl RouteRateLimitConfig {
    #[must_use]
    pub fn new(prefix: impl Into<String>, max_requests: u32, window_secs: u64) -> Self {
        Self {
            prefix: prefix.into(),
            limit: RateLimitConfig::new(max_requests, window_secs),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_config!(
            self.prefix.starts_with('/'),
            "rate limit prefix must start with '/': {}",
            self.prefix
        );
        self.limit.validate()
    }
}

/// 限流检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// 窗口内最早请求滑出窗口的时刻（毫秒）
    pub reset_at_ms: i64,
}

impl RateLimitOutcome {
    /// 距离重置的秒数，向上取整
    #[must_use]
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let remaining_ms = u64::try_from(self.reset_at_ms.saturating_sub(now_ms)).unwrap_or(0);
        remaining_ms.div_ceil(1000)
    }

    /// 重置时刻（Unix 秒，向上取整）
    #[must_use]
    pub fn reset_at_secs(&self) -> i64 {
        self.reset_at_ms.saturating_add(999).div_euclid(1000)
    }
}

/// 滑动窗口限流器
pub struct SlidingWindowRateLimiter {
    limit: u32,
    window_ms: i64,
    cleanup_interval: Duration,
    store: Arc<dyn WindowStore>,
    clock: SharedClock,
}

impl std::fmt::Debug for SlidingWindowRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowRateLimiter")
            .field("limit", &self.limit)
            .field("window_ms", &self.window_ms)
            .finish_non_exhaustive()
    }
}

impl SlidingWindowRateLimiter {
    /// 使用内存存储与系统时钟创建
    pub fn new(config: &RateLimitConfig) -> Result<Self> {
        Self::with_store(
            config,
            Arc::new(MemoryWindowStore::new()),
            SystemClock::shared(),
        )
    }

    pub fn with_store(
        config: &RateLimitConfig,
        store: Arc<dyn WindowStore>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            limit: config.max_requests,
            window_ms: duration_ms(config.window()),
            cleanup_interval: config.cleanup_interval(),
            store,
            clock,
        })
    }

    /// 检查并在放行时记录本次请求
    #[must_use]
    pub fn check(&self, key: &str) -> RateLimitOutcome {
        let now = self.clock.now_ms();
        let snapshot = self.store.check_and_record(
            key,
            now,
            self.window_ms,
            self.limit as usize,
        );
        let outcome = self.outcome(&snapshot, now);
        if !outcome.allowed {
            ldebug!(
                "system",
                LogStage::RateLimit,
                LogComponent::RateLimiter,
                "limit_exceeded",
                "request over limit",
                key = %key,
                reset_at_ms = outcome.reset_at_ms
            );
        }
        outcome
    }

    /// 只读查询，不记录请求
    #[must_use]
    pub fn status(&self, key: &str) -> RateLimitOutcome {
        let now = self.clock.now_ms();
        let snapshot = self.store.snapshot(key, now, self.window_ms);
        let mut outcome = self.outcome(&snapshot, now);
        outcome.allowed = snapshot.count < self.limit as usize;
        outcome
    }

    /// 清空某个键的窗口
    pub fn reset(&self, key: &str) {
        self.store.remove(key);
    }

    /// 回收空窗口，返回删除的键数量
    pub fn cleanup(&self) -> usize {
        self.store.sweep(self.clock.now_ms(), self.window_ms)
    }

    /// 当前跟踪的键数量
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// 启动周期清理，取消令牌触发后退出
    pub fn spawn_cleanup(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.cleanup_interval);
            // 第一次 tick 立即返回
            interval.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = limiter.cleanup();
                        if removed > 0 {
                            ldebug!(
                                "system",
                                LogStage::BackgroundTask,
                                LogComponent::RateLimiter,
                                "cleanup",
                                "idle rate limit windows removed",
                                removed = removed
                            );
                        }
                    }
                }
            }
            linfo!(
                "system",
                LogStage::Shutdown,
                LogComponent::RateLimiter,
                "cleanup_stopped",
                "rate limit cleanup stopped"
            );
        })
    }

    fn outcome(&self, snapshot: &WindowSnapshot, now_ms: i64) -> RateLimitOutcome {
        let used = u32::try_from(snapshot.count).unwrap_or(u32::MAX);
        RateLimitOutcome {
            allowed: snapshot.admitted,
            limit: self.limit,
            remaining: self.limit.saturating_sub(used),
            reset_at_ms: snapshot
                .oldest_ms
                .map_or(now_ms + self.window_ms, |oldest| oldest + self.window_ms),
        }
    }
}

/// 从请求头提取客户端键的函数
pub type KeyExtractor = Arc<dyn Fn(&HeaderMap) -> String + Send + Sync>;

/// 默认客户端键：`X-Forwarded-For` 最左项，其次 `X-Real-IP`，否则 `unknown`
#[must_use]
pub fn default_client_key(headers: &HeaderMap) -> String {
    if let Some(first) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| UNKNOWN_CLIENT.to_string(), ToString::to_string)
}

/// 按路径前缀组合的限流器，按配置顺序先匹配者生效
pub struct RouteRateLimiters {
    routes: Vec<(String, Arc<SlidingWindowRateLimiter>)>,
    key_extractor: KeyExtractor,
}

/// 组合限流的一次检查结果
#[derive(Debug, Clone)]
pub struct RouteCheck {
    pub prefix: String,
    pub key: String,
    pub outcome: RateLimitOutcome,
    pub now_ms: i64,
}

impl RouteRateLimiters {
    pub fn new(routes: &[RouteRateLimitConfig], clock: &SharedClock) -> Result<Self> {
        let routes = routes
            .iter()
            .map(|route| {
                route.validate()?;
                let limiter = SlidingWindowRateLimiter::with_store(
                    &route.limit,
                    Arc::new(MemoryWindowStore::new()),
                    clock.clone(),
                )?;
                Ok((route.prefix.clone(), Arc::new(limiter)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            routes,
            key_extractor: Arc::new(default_client_key),
        })
    }

    /// 替换客户端键提取函数
    #[must_use]
    pub fn with_key_extractor(mut self, extractor: KeyExtractor) -> Self {
        self.key_extractor = extractor;
        self
    }

    /// 路径命中的第一条规则
    #[must_use]
    pub fn match_route(&self, path: &str) -> Option<(&str, &Arc<SlidingWindowRateLimiter>)> {
        self.routes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(prefix, limiter)| (prefix.as_str(), limiter))
    }

    /// 检查请求；没有规则命中时返回 `None`
    #[must_use]
    pub fn check(&self, headers: &HeaderMap, path: &str) -> Option<RouteCheck> {
        let (prefix, limiter) = self.match_route(path)?;
        let key = format!("{}:{prefix}", (self.key_extractor)(headers));
        let outcome = limiter.check(&key);
        Some(RouteCheck {
            prefix: prefix.to_string(),
            key,
            outcome,
            now_ms: limiter.now_ms(),
        })
    }

    /// 为每条规则启动清理任务
    pub fn spawn_cleanup(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.routes
            .iter()
            .map(|(_, limiter)| limiter.spawn_cleanup(cancel.clone()))
            .collect()
    }

    /// 立即清理所有规则的空窗口
    pub fn cleanup(&self) -> usize {
        self.routes.iter().map(|(_, limiter)| limiter.cleanup()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
