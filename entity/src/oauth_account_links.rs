//! # OAuth 账户绑定实体定义
//!
//! 记录外部账户与本地实体之间的归属关系，(provider, external_account_id) 唯一

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// OAuth 账户绑定实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_account_links")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub provider: String,
    pub external_account_id: String,
    pub owner_id: String,
    /// 绑定时间（毫秒）
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
