//! # 认证模块
//!
//! - [`session`]：会话 Cookie 认证与滑动续期
//! - [`oauth_client`]：第三方 OAuth2 授权码 + PKCE 登录与账户绑定

pub mod oauth_client;
pub mod session;

pub use oauth_client::{
    AuthorizationRequest, ExchangeOutcome, OAuthConfig, OAuthPkceFlow, TokenResponse,
};
pub use session::{Authenticated, SessionAuthenticator, SessionConfig, SessionRenewal};
