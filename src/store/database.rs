//! # 数据库存储实现
//!
//! 会话令牌只以 SHA-256 摘要落库；续期是一条带过期条件的 `UPDATE`。

use super::{AccountLinkStore, SessionStore};
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::types::{LinkOutcome, Session};
use crate::{ldebug, lwarn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity::{auth_sessions, oauth_account_links};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use sha2::{Digest, Sha256};

/// 计算会话令牌摘要
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// 基于 Sea-ORM 的会话存储
#[derive(Debug, Clone)]
pub struct SeaOrmSessionStore {
    db: DatabaseConnection,
}

impl SeaOrmSessionStore {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for SeaOrmSessionStore {
    async fn find(&self, token: &str) -> Result<Option<Session>> {
        let model = auth_sessions::Entity::find()
            .filter(auth_sessions::Column::TokenHash.eq(hash_token(token)))
            .one(&self.db)
            .await?;

        Ok(model.map(|m| Session {
            token: token.to_string(),
            owner_id: m.owner_id,
            current_scope_id: m.current_scope_id,
            expires_at: from_millis(m.expires_at),
            created_at: from_millis(m.created_at),
        }))
    }

    async fn insert(&self, session: &Session) -> Result<()> {
        auth_sessions::ActiveModel {
            token_hash: Set(hash_token(&session.token)),
            owner_id: Set(session.owner_id.clone()),
            current_scope_id: Set(session.current_scope_id.clone()),
            expires_at: Set(session.expires_at.timestamp_millis()),
            created_at: Set(session.created_at.timestamp_millis()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn extend_expiry(
        &self,
        token: &str,
        now: DateTime<Utc>,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = auth_sessions::Entity::update_many()
            .col_expr(
                auth_sessions::Column::ExpiresAt,
                Expr::value(new_expires_at.timestamp_millis()),
            )
            .filter(auth_sessions::Column::TokenHash.eq(hash_token(token)))
            .filter(auth_sessions::Column::ExpiresAt.gt(now.timestamp_millis()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn delete(&self, token: &str) -> Result<()> {
        auth_sessions::Entity::delete_many()
            .filter(auth_sessions::Column::TokenHash.eq(hash_token(token)))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let result = auth_sessions::Entity::delete_many()
            .filter(auth_sessions::Column::ExpiresAt.lte(now.timestamp_millis()))
            .exec(&self.db)
            .await?;

        ldebug!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "purge_expired_sessions",
            "expired sessions purged",
            removed = result.rows_affected
        );
        Ok(usize::try_from(result.rows_affected).unwrap_or(usize::MAX))
    }
}

/// 基于 Sea-ORM 的账户绑定存储
#[derive(Debug, Clone)]
pub struct SeaOrmAccountLinkStore {
    db: DatabaseConnection,
}

impl SeaOrmAccountLinkStore {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn compare_owner(existing: String, owner_id: &str) -> LinkOutcome {
    if existing == owner_id {
        LinkOutcome::AlreadyLinked
    } else {
        LinkOutcome::Conflict {
            existing_owner: existing,
        }
    }
}

#[async_trait]
impl AccountLinkStore for SeaOrmAccountLinkStore {
    async fn owner_of(
        &self,
        provider: &str,
        external_account_id: &str,
    ) -> Result<Option<String>> {
        let model = oauth_account_links::Entity::find()
            .filter(oauth_account_links::Column::Provider.eq(provider))
            .filter(oauth_account_links::Column::ExternalAccountId.eq(external_account_id))
            .one(&self.db)
            .await?;
        Ok(model.map(|m| m.owner_id))
    }

    async fn link(
        &self,
        provider: &str,
        external_account_id: &str,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LinkOutcome> {
        if let Some(existing) = self.owner_of(provider, external_account_id).await? {
            return Ok(compare_owner(existing, owner_id));
        }

        let inserted = oauth_account_links::ActiveModel {
            provider: Set(provider.to_string()),
            external_account_id: Set(external_account_id.to_string()),
            owner_id: Set(owner_id.to_string()),
            created_at: Set(now.timestamp_millis()),
            ..Default::default()
        }
        .insert(&self.db)
        .await;

        match inserted {
            Ok(_) => Ok(LinkOutcome::Linked),
            Err(err) => {
                // 并发绑定撞上唯一索引时以已落库的归属为准
                lwarn!(
                    "system",
                    LogStage::Db,
                    LogComponent::Database,
                    "link_insert_failed",
                    "account link insert failed, re-reading owner",
                    error = %err
                );
                match self.owner_of(provider, external_account_id).await? {
                    Some(existing) => Ok(compare_owner(existing, owner_id)),
                    None => Err(err.into()),
                }
            }
        }
    }
}
