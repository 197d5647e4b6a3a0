//! # 错误处理测试

use crate::error::{Context, ErrorCategory, GuardError};
use axum::http::StatusCode;
use std::error::Error;

#[test]
fn test_config_error_creation() {
    let err = GuardError::config("secret too short");
    assert!(matches!(err, GuardError::Config { .. }));
    assert_eq!(err.to_string(), "配置错误: secret too short");
}

#[test]
fn test_config_error_with_source() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err = GuardError::config_with_source("failed to read config", io_err);

    assert!(err.to_string().contains("failed to read config"));
    assert!(err.source().is_some());
}

#[test]
fn test_http_mapping() {
    let cases = [
        (
            GuardError::credential("missing credential"),
            StatusCode::UNAUTHORIZED,
            "AUTHENTICATION_FAILED",
        ),
        (
            GuardError::CsrfRejected,
            StatusCode::FORBIDDEN,
            "CSRF_VALIDATION_FAILED",
        ),
        (
            GuardError::RateLimitExceeded {
                limit: 2,
                reset_at_ms: 0,
                retry_after_secs: 30,
            },
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMIT_EXCEEDED",
        ),
        (
            GuardError::exchange("state already used"),
            StatusCode::BAD_REQUEST,
            "OAUTH_EXCHANGE_FAILED",
        ),
        (
            GuardError::store("down"),
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORE_ERROR",
        ),
    ];

    for (err, status, code) in cases {
        assert_eq!(err.to_http_response_parts(), (status, code));
    }
}

#[test]
fn test_public_message_hides_internals() {
    let err = GuardError::store("redis://secret-host refused connection");
    assert_eq!(err.public_message(), "Internal server error");
    assert_eq!(err.category(), ErrorCategory::Server);

    let err = GuardError::credential("invalid or expired session");
    assert_eq!(err.public_message(), "invalid or expired session");
    assert_eq!(err.category(), ErrorCategory::Client);
}

#[test]
fn test_context_preserves_status() {
    let result: Result<(), GuardError> = Err(GuardError::CsrfRejected);
    let err = result.context("validating logout").unwrap_err();

    assert_eq!(err.to_string(), "validating logout");
    assert_eq!(err.to_http_response_parts().0, StatusCode::FORBIDDEN);
    assert!(err.source().is_some());
}

#[test]
fn test_macros() {
    fn check(len: usize) -> crate::error::Result<()> {
        crate::ensure_config!(len >= 32, "secret must be at least 32 characters, got {}", len);
        Ok(())
    }

    assert!(check(32).is_ok());
    let err = check(5).unwrap_err();
    assert!(err.to_string().contains("got 5"));

    let err = crate::exchange_error!("missing {}", "state");
    assert!(matches!(err, GuardError::Exchange { .. }));
}

#[test]
fn test_auto_conversion_from_toml_error() {
    let parse: Result<toml::Value, toml::de::Error> = toml::from_str("= broken");
    let err: GuardError = parse.unwrap_err().into();
    assert!(matches!(err, GuardError::Config { .. }));
}
