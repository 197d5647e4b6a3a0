//! # API 响应结构
//!
//! 成功与失败响应的统一 JSON 格式。拒绝响应只携带错误码与对外信息，
//! 不暴露具体是哪一项校验失败。

use crate::error::{ErrorCategory, GuardError};
use crate::lerror;
use crate::logging::{LogComponent, LogStage};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # 标准成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// # 标准错误信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// # 标准错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
    pub timestamp: DateTime<Utc>,
}

/// # API响应枚举
#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    Success(T),
    SuccessWithoutData(String),
    AppError(GuardError),
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Success(data) => (
                StatusCode::OK,
                Json(SuccessResponse {
                    success: true,
                    data: Some(data),
                    message: None,
                    timestamp: Utc::now(),
                }),
            )
                .into_response(),
            Self::SuccessWithoutData(message) => (
                StatusCode::OK,
                Json(SuccessResponse::<()> {
                    success: true,
                    data: None,
                    message: Some(message),
                    timestamp: Utc::now(),
                }),
            )
                .into_response(),
            Self::AppError(error) => error.into_response(),
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let (status, code) = self.to_http_response_parts();

        if self.category() == ErrorCategory::Server {
            lerror!(
                "system",
                LogStage::Response,
                LogComponent::ServerSetup,
                "server_error",
                "request failed with server error",
                code = code,
                error = %self
            );
        }

        let body = ErrorResponse {
            success: false,
            error: ErrorInfo {
                code: code.to_string(),
                message: self.public_message(),
            },
            timestamp: Utc::now(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimitExceeded {
            retry_after_secs, ..
        } = &self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }
        response
    }
}

/// # 便捷函数：成功响应
pub fn success<T: Serialize>(data: T) -> Response {
    ApiResponse::Success(data).into_response()
}

/// # 便捷函数：无数据体的成功响应
pub fn success_without_data(message: &str) -> Response {
    ApiResponse::<()>::SuccessWithoutData(message.to_string()).into_response()
}
