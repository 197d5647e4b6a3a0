//! # 存储抽象
//!
//! 请求安全核心只通过这些 trait 访问持久化：
//! - [`WindowStore`]：限流滑动窗口，同步接口，单键操作在一个分片锁内完成
//! - [`ExchangeStore`]：一次性交换记录，`consume` 原子地读取并删除
//! - [`SessionStore`]：会话记录，续期是单次条件更新
//! - [`AccountLinkStore`]：外部账户归属

use crate::error::Result;
use crate::types::{ExchangePayload, LinkOutcome, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub mod database;
pub mod memory;
pub mod redis;

pub use database::{SeaOrmAccountLinkStore, SeaOrmSessionStore};
pub use memory::{
    MemoryAccountLinkStore, MemoryExchangeStore, MemorySessionStore, MemoryWindowStore,
};
pub use redis::RedisExchangeStore;

/// 某个键在窗口内的快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// 窗口内保留的时间戳数量（含本次记录）
    pub count: usize,
    /// 窗口内最早的时间戳
    pub oldest_ms: Option<i64>,
    /// 本次是否被接纳
    pub admitted: bool,
}

/// 滑动窗口存储
pub trait WindowStore: Send + Sync {
    /// 丢弃 `<= now - window` 的时间戳；保留数小于 `limit` 时追加 `now`
    fn check_and_record(&self, key: &str, now_ms: i64, window_ms: i64, limit: usize)
    -> WindowSnapshot;

    /// 只读快照，不修改任何状态
    fn snapshot(&self, key: &str, now_ms: i64, window_ms: i64) -> WindowSnapshot;

    /// 删除某个键
    fn remove(&self, key: &str);

    /// 清理窗口已空的键，返回删除数量
    fn sweep(&self, now_ms: i64, window_ms: i64) -> usize;

    /// 当前跟踪的键数量
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 一次性交换存储
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    /// 写入记录，`ttl` 后失效
    async fn put(&self, key: &str, payload: ExchangePayload, ttl: Duration) -> Result<()>;

    /// 原子地取出并删除；缺失、已消费、已过期都返回 `None`
    async fn consume(&self, key: &str) -> Result<Option<ExchangePayload>>;

    /// 回收已过期但未被消费的记录
    async fn sweep(&self) -> Result<usize>;
}

/// 会话存储
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, token: &str) -> Result<Option<Session>>;

    async fn insert(&self, session: &Session) -> Result<()>;

    /// 仅当存储中的过期时间仍晚于 `now` 时更新为 `new_expires_at`，返回是否更新
    async fn extend_expiry(
        &self,
        token: &str,
        now: DateTime<Utc>,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn delete(&self, token: &str) -> Result<()>;

    /// 删除所有已过期会话
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// 外部账户绑定存储
#[async_trait]
pub trait AccountLinkStore: Send + Sync {
    async fn owner_of(&self, provider: &str, external_account_id: &str)
    -> Result<Option<String>>;

    /// 绑定外部账户；已被其他实体绑定时返回冲突而不覆盖
    async fn link(
        &self,
        provider: &str,
        external_account_id: &str,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LinkOutcome>;
}
