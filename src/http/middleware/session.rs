//! # 会话认证中间件
//!
//! 认证成功后把 [`Identity`](crate::types::Identity) 放入请求扩展；
//! 发生续期时在响应中追加 `Set-Cookie`；处理器已写出会话 Cookie（如注销）时不再追加。

use super::request_id::request_id_of;
use crate::http::cookies::{append_renewal_cookies, sets_cookie};
use crate::http::server::AppState;
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let authenticated = match state.sessions.authenticate(request.headers()).await {
        Ok(authenticated) => authenticated,
        Err(err) => {
            ldebug!(
                request_id_of(&request),
                LogStage::Authentication,
                LogComponent::Session,
                "authentication_rejected",
                "session authentication failed",
                path = %request.uri().path(),
                reason = %err
            );
            return err.into_response();
        }
    };

    request
        .extensions_mut()
        .insert(authenticated.identity.clone());

    let mut response = next.run(request).await;
    let handler_set_session =
        sets_cookie(response.headers(), &state.sessions.config().cookie_name);
    if let Some(renewal) = authenticated.renewal.as_ref().filter(|_| !handler_set_session) {
        append_renewal_cookies(
            response.headers_mut(),
            &state.sessions,
            &state.csrf,
            renewal,
        );
    }
    response
}
