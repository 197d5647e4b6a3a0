//! # 时钟源
//!
//! 所有时间判断都经由 [`Clock`]，生产环境用系统时间，测试中用 [`ManualClock`] 精确推进。

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// 墙上时钟抽象，精度为毫秒
pub trait Clock: Send + Sync {
    /// 当前 Unix 时间戳（毫秒）
    fn now_ms(&self) -> i64;

    /// 当前时间
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms()).unwrap_or_default()
    }
}

/// 共享时钟句柄
pub type SharedClock = Arc<dyn Clock>;

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

impl SystemClock {
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

/// 手动推进的时钟，用于测试
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    /// 时钟向前推进
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }

    /// 直接设置当前时间
    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// `Duration` 转毫秒，超界时饱和
#[must_use]
pub fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
