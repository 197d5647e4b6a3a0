//! # Cookie 写出辅助

use crate::auth::{SessionAuthenticator, SessionRenewal};
use crate::security::CsrfGuard;
use axum::http::{HeaderMap, HeaderValue, header};
use axum_extra::extract::cookie::{Cookie, SameSite};

/// OAuth 中转 Cookie 名称
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// 追加一个 `Set-Cookie` 头；值不合法时丢弃
pub fn append_set_cookie(headers: &mut HeaderMap, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.append(header::SET_COOKIE, value);
    }
}

/// 响应中是否已有指定名称的 `Set-Cookie`
#[must_use]
pub fn sets_cookie(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split_once('='))
        .any(|(key, _)| key.trim() == name)
}

/// 续期后回写会话 Cookie，以及请求里原有的 CSRF Cookie
pub fn append_renewal_cookies(
    headers: &mut HeaderMap,
    sessions: &SessionAuthenticator,
    csrf: &CsrfGuard,
    renewal: &SessionRenewal,
) {
    append_set_cookie(headers, &sessions.renewal_cookie_header(renewal));
    if let Some(token) = &renewal.csrf_token {
        append_set_cookie(headers, &csrf.cookie_header_for(token));
    }
}

/// OAuth `state` 中转 Cookie，作用域限定在 OAuth 路由前缀
#[must_use]
pub fn oauth_state_cookie(
    state: &str,
    route_prefix: &str,
    max_age_secs: u64,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, state.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(route_prefix.to_string())
        .max_age(time::Duration::seconds(
            i64::try_from(max_age_secs).unwrap_or(i64::MAX),
        ))
        .build()
}

/// 清除中转 Cookie
#[must_use]
pub fn clear_oauth_state_cookie(route_prefix: &str, secure: bool) -> Cookie<'static> {
    oauth_state_cookie("", route_prefix, 0, secure)
}
