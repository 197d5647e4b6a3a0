//! # 基础路由处理器

use crate::http::cookies::append_set_cookie;
use crate::http::response::{success, success_without_data};
use crate::http::server::AppState;
use crate::types::Identity;
use axum::{
    Extension,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

pub async fn ping_handler() -> &'static str {
    "pong"
}

/// 新签发的 CSRF 令牌
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfTokenBody {
    pub token: String,
    pub header_name: String,
}

/// 签发 CSRF 令牌并下发 Cookie
pub async fn csrf_token_handler(State(state): State<AppState>) -> Response {
    let token = state.csrf.issue();
    let cookie = state.csrf.cookie_header_for(&token);
    let mut response = success(CsrfTokenBody {
        token,
        header_name: state.config.csrf.header_name.clone(),
    });
    append_set_cookie(response.headers_mut(), &cookie);
    response
}

/// 当前会话身份
pub async fn session_handler(Extension(identity): Extension<Identity>) -> Response {
    success(identity)
}

/// 注销：删除会话并清除 Cookie
pub async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = state.sessions.token_from_headers(&headers) {
        if let Err(err) = state.sessions.revoke(&token).await {
            return err.into_response();
        }
    }
    let mut response = success_without_data("已退出登录");
    append_set_cookie(
        response.headers_mut(),
        &state.sessions.clear_session_cookie_header(),
    );
    response
}
