//! # HTTP 适配层
//!
//! 把请求安全原语接到 axum：中间件、基础路由、OAuth 路由与统一响应格式。

pub mod cookies;
pub mod handlers;
pub mod middleware;
pub mod oauth_routes;
pub mod response;
pub mod server;

pub use response::{ApiResponse, ErrorInfo, ErrorResponse};
pub use server::{AppState, build_router, serve};
