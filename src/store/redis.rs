//! # Redis 一次性交换存储
//!
//! `SET key value EX ttl` 写入，`GETDEL` 在一次往返内读取并删除，
//! 多实例部署下同一个 state 也只会被消费一次。过期交给 Redis 自身处理。

use super::ExchangeStore;
use crate::error::{Context, GuardError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::types::ExchangePayload;
use crate::{ldebug, linfo};
use async_trait::async_trait;
use redis::{Client, aio::ConnectionManager};
use std::time::Duration;

/// Redis 一次性交换存储
#[derive(Clone)]
pub struct RedisExchangeStore {
    connection_manager: ConnectionManager,
    key_prefix: String,
}

impl RedisExchangeStore {
    /// 连接 Redis
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        linfo!(
            "system",
            LogStage::Cache,
            LogComponent::Redis,
            "connect_to_redis",
            "正在连接 Redis"
        );

        let client = Client::open(url)
            .map_err(|e| GuardError::config_with_source("创建 Redis 客户端失败", e))?;
        let connection_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| GuardError::store_with_source("建立 Redis 连接失败", e))?;

        linfo!(
            "system",
            LogStage::Cache,
            LogComponent::Redis,
            "redis_connected",
            "Redis 连接建立成功"
        );

        Ok(Self {
            connection_manager,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}exchange:{key}", self.key_prefix)
    }
}

#[async_trait]
impl ExchangeStore for RedisExchangeStore {
    async fn put(&self, key: &str, payload: ExchangePayload, ttl: Duration) -> Result<()> {
        let value = serde_json::to_string(&payload).context("序列化交换记录失败")?;
        let mut conn = self.connection_manager.clone();
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await
            .context("写入交换记录失败")?;
        Ok(())
    }

    async fn consume(&self, key: &str) -> Result<Option<ExchangePayload>> {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = redis::cmd("GETDEL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await?;

        match raw {
            Some(value) => Ok(Some(
                serde_json::from_str(&value).context("交换记录格式无效")?,
            )),
            None => {
                ldebug!(
                    "system",
                    LogStage::Cache,
                    LogComponent::ExchangeStore,
                    "consume_miss",
                    "exchange record missing, consumed or expired"
                );
                Ok(None)
            }
        }
    }

    async fn sweep(&self) -> Result<usize> {
        // EX 已保证过期回收
        Ok(0)
    }
}
