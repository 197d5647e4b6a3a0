//! # OAuth 路由
//!
//! - `GET {prefix}/start?client=...`：302 跳转到提供商，并设置 `state` 中转 Cookie
//! - `GET {prefix}/callback?code&state`：完成交换后 302 跳回落地页，
//!   附带 `?oauth=success` 或 `?oauth=error`，中转 Cookie 无论成败都会清除
//!
//! 登录流程成功时同时建立会话并下发会话与 CSRF Cookie。

use crate::auth::OAuthPkceFlow;
use crate::error::{GuardError, Result};
use crate::exchange_error;
use crate::http::cookies::{
    OAUTH_STATE_COOKIE, append_renewal_cookies, append_set_cookie, clear_oauth_state_cookie,
    oauth_state_cookie,
};
use crate::http::middleware::request_id::RequestId;
use crate::http::server::AppState;
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};
use axum::{
    Extension, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::sync::Arc;

/// 未指定 `client` 时使用的客户端标识
pub const DEFAULT_CLIENT: &str = "web";

#[derive(Debug, Default, Deserialize)]
pub struct StartParams {
    pub client: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// 提供商拒绝授权时返回
    pub error: Option<String>,
}

/// OAuth 路由
pub fn oauth_router(route_prefix: &str) -> Router<AppState> {
    Router::new()
        .route(&format!("{route_prefix}/start"), get(start_handler))
        .route(&format!("{route_prefix}/callback"), get(callback_handler))
}

fn found(location: &str) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

fn landing_url(landing_path: &str, result: &str) -> String {
    let separator = if landing_path.contains('?') { '&' } else { '?' };
    format!("{landing_path}{separator}oauth={result}")
}

fn request_id_string(request_id: Option<Extension<RequestId>>) -> String {
    request_id.map_or_else(|| "system".to_string(), |Extension(id)| id.to_string())
}

fn oauth_flow(state: &AppState) -> Result<Arc<OAuthPkceFlow>> {
    state
        .oauth
        .clone()
        .ok_or_else(|| GuardError::internal("oauth is not configured"))
}

async fn start_handler(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    Query(params): Query<StartParams>,
) -> Response {
    let flow = match oauth_flow(&state) {
        Ok(flow) => flow,
        Err(err) => return err.into_response(),
    };
    let request_id = request_id_string(request_id);
    let client = params
        .client
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT.to_string());

    // 已登录时进入绑定模式
    let authenticated = state.sessions.authenticate(&headers).await.ok();
    let owner_context = authenticated
        .as_ref()
        .map(|a| a.identity.owner_id.as_str());

    let request = match flow.start(&client, owner_context).await {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    linfo!(
        request_id,
        LogStage::OAuthStart,
        LogComponent::OAuth,
        "redirect_to_provider",
        "redirecting to identity provider",
        client = %client
    );

    let config = flow.config();
    let mut response = found(&request.url);
    append_set_cookie(
        response.headers_mut(),
        &oauth_state_cookie(
            &request.state,
            &config.route_prefix,
            config.state_ttl_secs,
            state.config.environment.is_production(),
        )
        .to_string(),
    );
    if let Some(renewal) = authenticated.as_ref().and_then(|a| a.renewal.as_ref()) {
        append_renewal_cookies(
            response.headers_mut(),
            &state.sessions,
            &state.csrf,
            renewal,
        );
    }
    response
}

async fn callback_handler(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let flow = match oauth_flow(&state) {
        Ok(flow) => flow,
        Err(err) => return err.into_response(),
    };
    let request_id = request_id_string(request_id);
    let config = flow.config();
    let secure = state.config.environment.is_production();

    let transit = CookieJar::from_headers(&headers)
        .get(OAUTH_STATE_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let (result, cookies) = match complete_callback(&state, &flow, &params, transit.as_deref()).await
    {
        Ok(cookies) => ("success", cookies),
        Err(err) => {
            lwarn!(
                request_id,
                LogStage::OAuthCallback,
                LogComponent::OAuth,
                "callback_failed",
                "oauth callback failed",
                error = %err
            );
            ("error", Vec::new())
        }
    };

    let mut response = found(&landing_url(&config.landing_path, result));
    append_set_cookie(
        response.headers_mut(),
        &clear_oauth_state_cookie(&config.route_prefix, secure).to_string(),
    );
    for cookie in &cookies {
        append_set_cookie(response.headers_mut(), cookie);
    }
    response
}

/// 完成回调，返回需要额外下发的 `Set-Cookie` 值
async fn complete_callback(
    state: &AppState,
    flow: &OAuthPkceFlow,
    params: &CallbackParams,
    transit: Option<&str>,
) -> Result<Vec<String>> {
    let query_state = params.state.as_deref().filter(|s| !s.is_empty());
    let oauth_state = match (query_state, transit) {
        (Some(query), Some(cookie)) if query != cookie => {
            return Err(exchange_error!("state 与中转 Cookie 不一致"));
        }
        (Some(value), _) | (None, Some(value)) => value.to_string(),
        (None, None) => return Err(exchange_error!("缺少 state 参数")),
    };

    if let Some(error) = &params.error {
        // 提供商拒绝授权时作废该 state
        state.exchange_store.consume(&oauth_state).await?;
        return Err(exchange_error!("提供商返回错误: {}", error));
    }

    let code = params.code.as_deref().unwrap_or_default();
    let outcome = flow.complete(code, &oauth_state).await?;
    if !outcome.is_login() {
        return Ok(Vec::new());
    }

    let owner_id = flow.resolve_login_owner(&outcome).await?;
    let session = state.sessions.create_session(&owner_id, None).await?;
    let csrf_token = state.csrf.issue();

    Ok(vec![
        state.sessions.session_cookie_header(&session),
        state.csrf.cookie_header_for(&csrf_token),
    ])
}
