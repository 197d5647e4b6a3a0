//! # 内存存储实现
//!
//! 基于 `DashMap`，组合操作（裁剪并追加、读取并删除、条件续期）都在单个分片锁内完成，
//! 锁内不跨越 `.await`。

use super::{AccountLinkStore, ExchangeStore, SessionStore, WindowSnapshot, WindowStore};
use crate::error::Result;
use crate::types::{ExchangePayload, ExchangeRecord, LinkOutcome, Session};
use crate::utils::clock::{SharedClock, SystemClock, duration_ms};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::VecDeque;
use std::time::Duration;

/// 内存滑动窗口存储
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    windows: DashMap<String, VecDeque<i64>>,
}

impl MemoryWindowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn prune(timestamps: &mut VecDeque<i64>, cutoff: i64) {
    while timestamps.front().is_some_and(|&ts| ts <= cutoff) {
        timestamps.pop_front();
    }
}

impl WindowStore for MemoryWindowStore {
    fn check_and_record(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: usize,
    ) -> WindowSnapshot {
        let mut timestamps = self.windows.entry(key.to_string()).or_default();
        prune(&mut timestamps, now_ms - window_ms);

        let admitted = timestamps.len() < limit;
        if admitted {
            timestamps.push_back(now_ms);
        }

        WindowSnapshot {
            count: timestamps.len(),
            oldest_ms: timestamps.front().copied(),
            admitted,
        }
    }

    fn snapshot(&self, key: &str, now_ms: i64, window_ms: i64) -> WindowSnapshot {
        let cutoff = now_ms - window_ms;
        self.windows.get(key).map_or(
            WindowSnapshot {
                count: 0,
                oldest_ms: None,
                admitted: true,
            },
            |timestamps| {
                let mut live = timestamps.iter().copied().filter(|&ts| ts > cutoff);
                let oldest_ms = live.next();
                let count = oldest_ms.map_or(0, |_| 1 + live.count());
                WindowSnapshot {
                    count,
                    oldest_ms,
                    admitted: true,
                }
            },
        )
    }

    fn remove(&self, key: &str) {
        self.windows.remove(key);
    }

    fn sweep(&self, now_ms: i64, window_ms: i64) -> usize {
        let cutoff = now_ms - window_ms;
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            prune(timestamps, cutoff);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

/// 内存一次性交换存储
pub struct MemoryExchangeStore {
    records: DashMap<String, ExchangeRecord>,
    clock: SharedClock,
}

impl MemoryExchangeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// 当前持有的记录数（含已过期未回收的）
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryExchangeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeStore for MemoryExchangeStore {
    async fn put(&self, key: &str, payload: ExchangePayload, ttl: Duration) -> Result<()> {
        let now = self.clock.now_ms();
        self.records.insert(
            key.to_string(),
            ExchangeRecord {
                payload,
                created_at_ms: now,
                expires_at_ms: now.saturating_add(duration_ms(ttl)),
            },
        );
        Ok(())
    }

    async fn consume(&self, key: &str) -> Result<Option<ExchangePayload>> {
        let now = self.clock.now_ms();
        Ok(self
            .records
            .remove(key)
            .filter(|(_, record)| record.expires_at_ms > now)
            .map(|(_, record)| record.payload))
    }

    async fn sweep(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at_ms > now);
        Ok(before.saturating_sub(self.records.len()))
    }
}

/// 内存会话存储
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find(&self, token: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(token).map(|s| s.value().clone()))
    }

    async fn insert(&self, session: &Session) -> Result<()> {
        self.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn extend_expiry(
        &self,
        token: &str,
        now: DateTime<Utc>,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(match self.sessions.get_mut(token) {
            Some(mut session) if session.expires_at > now => {
                session.expires_at = new_expires_at;
                true
            }
            _ => false,
        })
    }

    async fn delete(&self, token: &str) -> Result<()> {
        self.sessions.remove(token);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok(before.saturating_sub(self.sessions.len()))
    }
}

/// 内存账户绑定存储
#[derive(Debug, Default)]
pub struct MemoryAccountLinkStore {
    links: DashMap<(String, String), String>,
}

impl MemoryAccountLinkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountLinkStore for MemoryAccountLinkStore {
    async fn owner_of(
        &self,
        provider: &str,
        external_account_id: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .links
            .get(&(provider.to_string(), external_account_id.to_string()))
            .map(|owner| owner.value().clone()))
    }

    async fn link(
        &self,
        provider: &str,
        external_account_id: &str,
        owner_id: &str,
        _now: DateTime<Utc>,
    ) -> Result<LinkOutcome> {
        let key = (provider.to_string(), external_account_id.to_string());
        Ok(match self.links.entry(key) {
            Entry::Occupied(existing) if existing.get() == owner_id => LinkOutcome::AlreadyLinked,
            Entry::Occupied(existing) => LinkOutcome::Conflict {
                existing_owner: existing.get().clone(),
            },
            Entry::Vacant(slot) => {
                slot.insert(owner_id.to_string());
                LinkOutcome::Linked
            }
        })
    }
}
