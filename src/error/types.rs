//! # 错误类型定义

use super::ErrorCategory;
use axum::http::StatusCode;
use thiserror::Error;

/// 请求安全核心的统一错误类型
#[derive(Debug, Error)]
pub enum GuardError {
    /// 配置错误，启动阶段即失败
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 凭证缺失、无效或过期
    #[error("认证失败: {message}")]
    Credential { message: String },

    /// CSRF 校验失败，不区分具体原因
    #[error("CSRF 校验失败")]
    CsrfRejected,

    /// 请求超出速率限制
    #[error("速率限制: {retry_after_secs} 秒后重试")]
    RateLimitExceeded {
        limit: u32,
        reset_at_ms: i64,
        retry_after_secs: u64,
    },

    /// OAuth 授权交换失败，对当前流程是终态
    #[error("OAuth 交换失败: {message}")]
    Exchange {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 存储后端错误（数据库、Redis、序列化）
    #[error("存储错误: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 附加上下文的错误
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<GuardError>,
    },
}

impl GuardError {
    /// 映射为 HTTP 状态码与错误码
    #[must_use]
    pub fn to_http_response_parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Self::Credential { .. } => (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED"),
            Self::CsrfRejected => (StatusCode::FORBIDDEN, "CSRF_VALIDATION_FAILED"),
            Self::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED")
            }
            Self::Exchange { .. } => (StatusCode::BAD_REQUEST, "OAUTH_EXCHANGE_FAILED"),
            Self::Store { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Context { source, .. } => source.to_http_response_parts(),
        }
    }

    /// 对外暴露的错误信息，不携带内部细节
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Credential { message } => message.clone(),
            Self::CsrfRejected => "CSRF token validation failed".to_string(),
            Self::RateLimitExceeded { .. } => "Too many requests".to_string(),
            Self::Exchange { .. } => "OAuth authorization could not be completed".to_string(),
            Self::Context { source, .. } => source.public_message(),
            Self::Config { .. } | Self::Store { .. } | Self::Internal { .. } => {
                "Internal server error".to_string()
            }
        }
    }

    /// 错误分类
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        if self.to_http_response_parts().0.is_client_error() {
            ErrorCategory::Client
        } else {
            ErrorCategory::Server
        }
    }

    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn credential<T: Into<String>>(message: T) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    pub fn exchange<T: Into<String>>(message: T) -> Self {
        Self::Exchange {
            message: message.into(),
            source: None,
        }
    }

    pub fn exchange_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Exchange {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn store<T: Into<String>>(message: T) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    pub fn store_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<sea_orm::DbErr> for GuardError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::store_with_source("数据库操作失败", err)
    }
}

impl From<redis::RedisError> for GuardError {
    fn from(err: redis::RedisError) -> Self {
        Self::store_with_source("Redis 操作失败", err)
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        Self::store_with_source("序列化失败", err)
    }
}

impl From<toml::de::Error> for GuardError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("配置文件解析失败", err)
    }
}

impl From<std::io::Error> for GuardError {
    fn from(err: std::io::Error) -> Self {
        Self::internal_with_source("IO 操作失败", err)
    }
}

impl From<reqwest::Error> for GuardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::exchange_with_source("令牌端点请求超时", err)
        } else {
            Self::exchange_with_source("令牌端点请求失败", err)
        }
    }
}
