//! # CSRF 中间件

use super::request_id::request_id_of;
use crate::error::GuardError;
use crate::http::server::AppState;
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// 改变状态的请求必须通过双重提交校验，否则统一返回 403
pub async fn csrf_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.csrf.validate(&request) {
        lwarn!(
            request_id_of(&request),
            LogStage::CsrfCheck,
            LogComponent::Csrf,
            "csrf_rejected",
            "request rejected by csrf guard",
            method = %request.method(),
            path = %request.uri().path()
        );
        return GuardError::CsrfRejected.into_response();
    }
    next.run(request).await
}
