//! # 领域类型
//!
//! 会话、身份、一次性交换载荷和账户绑定结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 服务端会话记录，以持有者令牌为键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// 持有者令牌，仅在内存与 Cookie 中出现
    #[serde(skip)]
    pub token: String,
    pub owner_id: String,
    pub current_scope_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// 在给定时刻是否已过期
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// 已认证身份，沿请求扩展向下游传递
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub owner_id: String,
    pub current_scope_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for Identity {
    fn from(session: &Session) -> Self {
        Self {
            owner_id: session.owner_id.clone(),
            current_scope_id: session.current_scope_id.clone(),
            expires_at: session.expires_at,
        }
    }
}

/// OAuth 授权开始时暂存的一次性载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePayload {
    pub code_verifier: String,
    pub client_identifier: String,
    /// 已登录实体发起账户绑定时携带；为空表示登录流程
    pub owner_context: Option<String>,
}

/// 一次性交换记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub payload: ExchangePayload,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

/// 账户绑定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// 新建绑定
    Linked,
    /// 已绑定到同一实体，幂等
    AlreadyLinked,
    /// 已被其他实体绑定
    Conflict { existing_owner: String },
}
