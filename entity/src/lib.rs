//! # Entity 模块
//!
//! 包含所有 Sea-ORM 实体定义

pub mod auth_sessions;
pub mod oauth_account_links;

pub use auth_sessions::Entity as AuthSessions;
pub use oauth_account_links::Entity as OAuthAccountLinks;
