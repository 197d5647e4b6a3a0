//! # HTTP 服务器
//!
//! 组装路由与中间件。请求依次经过：Trace → Request ID → 限流 → CSRF → 路由；
//! 需要身份的路由再经过会话认证。

use super::handlers::{csrf_token_handler, logout_handler, ping_handler, session_handler};
use super::middleware::{
    csrf_middleware, rate_limit_middleware, request_id_middleware, session_auth_middleware,
};
use super::oauth_routes::oauth_router;
use crate::app::context::AppContext;
use crate::error::{GuardError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use std::ops::Deref;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// 路由共享状态
#[derive(Clone, Debug)]
pub struct AppState {
    context: Arc<AppContext>,
}

impl AppState {
    #[must_use]
    pub const fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }
}

impl Deref for AppState {
    type Target = AppContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

/// 创建路由器
pub fn build_router(context: Arc<AppContext>) -> Router {
    let state = AppState::new(context);

    let protected = Router::new()
        .route("/api/session", get(session_handler))
        .route("/api/logout", post(logout_handler))
        .route_layer(from_fn_with_state(state.clone(), session_auth_middleware));

    let mut app = Router::new()
        .route("/ping", get(ping_handler))
        .route("/api/csrf-token", get(csrf_token_handler))
        .merge(protected);

    if let Some(flow) = &state.oauth {
        app = app.merge(oauth_router(&flow.config().route_prefix));
    }

    // ServiceBuilder 中先声明的层在外侧
    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id_middleware))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), csrf_middleware));

    app.layer(layers).with_state(state)
}

/// 启动服务器，取消令牌触发后优雅退出
pub async fn serve(context: Arc<AppContext>, shutdown: CancellationToken) -> Result<()> {
    let bind_address = context.config.server.bind_address();
    let listener = TcpListener::bind(&bind_address).await.map_err(|e| {
        GuardError::internal_with_source(format!("无法绑定地址 {bind_address}"), e)
    })?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "server_listening",
        "HTTP 服务已启动",
        address = %bind_address
    );

    let router = build_router(context);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::ServerSetup,
        "server_stopped",
        "HTTP 服务已停止"
    );
    Ok(())
}
