//! # 集成测试公共工具
//!
//! 内存存储、手动时钟和模拟的 OAuth 令牌端点

#![allow(dead_code)]

use request_guard::app::AppContext;
use request_guard::auth::OAuthConfig;
use request_guard::config::{AppConfig, PersistenceBackend};
use request_guard::utils::{ManualClock, OsRandom};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SECRET: &str = "integration-secret-0123456789abcdef";
pub const OTHER_SECRET: &str = "another-secret-fedcba9876543210xyz";

/// 2026-01-01T00:00:00Z
pub const START_MS: i64 = 1_767_225_600_000;

/// 内存后端的默认配置
pub fn memory_config() -> AppConfig {
    let mut config = AppConfig::with_secret(SECRET);
    config.store.session_backend = PersistenceBackend::Memory;
    config
}

/// 指向模拟提供商的 OAuth 配置
pub fn oauth_config(server: &MockServer) -> OAuthConfig {
    OAuthConfig {
        provider: "acme".to_string(),
        client_id: "client-1".to_string(),
        authorize_url: "https://idp.example.com/authorize".to_string(),
        token_url: format!("{}/token", server.uri()),
        redirect_uri: "http://localhost:8080/oauth/callback".to_string(),
        scopes: vec!["openid".to_string()],
        landing_path: "/app".to_string(),
        ..OAuthConfig::default()
    }
}

/// 启动一个总是返回成功令牌的模拟提供商
pub async fn token_server(account_id: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "provider-access-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "account_id": account_id
        })))
        .mount(&server)
        .await;
    server
}

/// 使用手动时钟构建上下文
pub async fn context_with_clock(config: AppConfig) -> (Arc<AppContext>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START_MS));
    let context = AppContext::from_config_with_sources(config, clock.clone(), OsRandom::shared())
        .await
        .expect("context should build");
    (Arc::new(context), clock)
}

/// 从 `Set-Cookie` 值中取出 `name=value` 的 value
pub fn cookie_value(set_cookie: &str, name: &str) -> Option<String> {
    let (pair, _) = set_cookie.split_once(';').unwrap_or((set_cookie, ""));
    let (key, value) = pair.split_once('=')?;
    (key.trim() == name).then(|| value.trim().to_string())
}

/// 在响应的所有 `Set-Cookie` 中查找指定 Cookie
pub fn find_set_cookie(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| cookie_value(v, name).is_some())
        .map(ToString::to_string)
}

/// 响应中指定 Cookie 的全部 `Set-Cookie`，按写出顺序
pub fn all_set_cookies(headers: &axum::http::HeaderMap, name: &str) -> Vec<String> {
    headers
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| cookie_value(v, name).is_some())
        .map(ToString::to_string)
        .collect()
}
