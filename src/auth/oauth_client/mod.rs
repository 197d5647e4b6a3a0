//! # `OAuth客户端模块`
//!
//! 授权码 + PKCE（RFC 7636）流程：
//! - 开始阶段生成 verifier/challenge 与 `state`，一次性记录存入交换存储
//! - 回调阶段原子地消费 `state`，再向令牌端点换取访问令牌
//! - 已登录实体发起时进入绑定模式，外部账户已属于他人则拒绝

pub mod flow;
pub mod pkce;
pub mod token_exchange;

pub use flow::{AuthorizationRequest, ExchangeOutcome, OAuthPkceFlow};
pub use pkce::PkcePair;
pub use token_exchange::{TokenExchangeClient, TokenResponse};

use crate::ensure_config;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// OAuth 提供商配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// 提供商名称，作为账户绑定的命名空间
    pub provider: String,
    pub client_id: String,
    /// 机密客户端才需要；公共客户端仅依赖 PKCE
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// 追加到授权 URL 的参数
    pub extra_authorize_params: BTreeMap<String, String>,
    /// 令牌响应中外部账户标识的字段路径，`.` 分隔
    pub account_id_field: String,
    /// `state` 有效期（秒）
    pub state_ttl_secs: u64,
    /// 令牌端点请求超时（秒）
    pub request_timeout_secs: u64,
    /// 路由前缀
    pub route_prefix: String,
    /// 回调完成后跳转的页面
    pub landing_path: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            provider: "example".to_string(),
            client_id: String::new(),
            client_secret: None,
            authorize_url: String::new(),
            token_url: String::new(),
            redirect_uri: String::new(),
            scopes: Vec::new(),
            extra_authorize_params: BTreeMap::new(),
            account_id_field: "account_id".to_string(),
            state_ttl_secs: 600,
            request_timeout_secs: 30,
            route_prefix: "/oauth".to_string(),
            landing_path: "/".to_string(),
        }
    }
}

impl OAuthConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_config!(!self.provider.is_empty(), "oauth.provider cannot be empty");
        ensure_config!(!self.client_id.is_empty(), "oauth.client_id cannot be empty");
        for (name, value) in [
            ("oauth.authorize_url", &self.authorize_url),
            ("oauth.token_url", &self.token_url),
            ("oauth.redirect_uri", &self.redirect_uri),
        ] {
            ensure_config!(!value.is_empty(), "{} cannot be empty", name);
            ensure_config!(Url::parse(value).is_ok(), "{} is not a valid URL: {}", name, value);
        }
        ensure_config!(
            self.state_ttl_secs > 0,
            "oauth.state_ttl_secs must be greater than 0"
        );
        ensure_config!(
            self.request_timeout_secs > 0,
            "oauth.request_timeout_secs must be greater than 0"
        );
        ensure_config!(
            self.route_prefix.starts_with('/') && !self.route_prefix.ends_with('/'),
            "oauth.route_prefix must start with '/' and not end with '/'"
        );
        ensure_config!(
            !self.account_id_field.is_empty(),
            "oauth.account_id_field cannot be empty"
        );
        Ok(())
    }

    #[must_use]
    pub const fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 授权开始路由
    #[must_use]
    pub fn start_path(&self) -> String {
        format!("{}/start", self.route_prefix)
    }

    /// 回调路由
    #[must_use]
    pub fn callback_path(&self) -> String {
        format!("{}/callback", self.route_prefix)
    }
}
