//! # 认证会话实体定义
//!
//! 会话令牌只以 SHA-256 摘要形式落库，时间字段使用毫秒级 Unix 时间戳

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 认证会话实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "auth_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub token_hash: String,
    pub owner_id: String,
    pub current_scope_id: Option<String>,
    /// 过期时间（毫秒）
    pub expires_at: i64,
    /// 创建时间（毫秒）
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
