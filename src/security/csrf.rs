//! # CSRF 双重提交校验
//!
//! 改变状态的请求必须同时携带 Cookie 副本与请求头副本，两者逐字节一致，
//! 且 Cookie 中的令牌通过签名与时效校验。任何一项失败都给出同一个拒绝结果。

use crate::config::Environment;
use crate::ensure_config;
use crate::error::{GuardError, Result};
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use crate::security::token::{MIN_SECRET_LENGTH, SignedTokenCodec};
use crate::utils::clock::{SharedClock, SystemClock};
use crate::utils::random::{OsRandom, SharedRandom};
use axum::http::{HeaderMap, HeaderName, Method, Request};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use subtle::ConstantTimeEq;

/// CSRF 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// 签名密钥，至少 32 个字符
    pub secret: String,
    /// 令牌有效期（秒）
    pub ttl_secs: u64,
    /// 请求头名称
    pub header_name: String,
    /// Cookie 名称
    pub cookie_name: String,
    /// 需要校验的方法
    pub protected_methods: Vec<String>,
    /// 免校验的路径前缀，例如外部签名的 webhook
    pub exempt_path_prefixes: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_secs: 86_400,
            header_name: "X-CSRF-Token".to_string(),
            cookie_name: "csrf_token".to_string(),
            protected_methods: ["POST", "PUT", "PATCH", "DELETE"]
                .into_iter()
                .map(String::from)
                .collect(),
            exempt_path_prefixes: Vec::new(),
        }
    }
}

impl CsrfConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_config!(
            self.secret.chars().count() >= MIN_SECRET_LENGTH,
            "csrf.secret must be at least {} characters",
            MIN_SECRET_LENGTH
        );
        ensure_config!(self.ttl_secs > 0, "csrf.ttl_secs must be greater than 0");
        ensure_config!(
            !self.cookie_name.is_empty(),
            "csrf.cookie_name cannot be empty"
        );
        Ok(())
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// CSRF 双重提交校验器
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    codec: SignedTokenCodec,
    ttl: Duration,
    header_name: HeaderName,
    cookie_name: String,
    protected_methods: HashSet<Method>,
    exempt_path_prefixes: Vec<String>,
    secure_cookie: bool,
}

impl CsrfGuard {
    pub fn new(config: &CsrfConfig, environment: Environment) -> Result<Self> {
        Self::with_sources(
            config,
            environment,
            SystemClock::shared(),
            OsRandom::shared(),
        )
    }

    pub fn with_sources(
        config: &CsrfConfig,
        environment: Environment,
        clock: SharedClock,
        random: SharedRandom,
    ) -> Result<Self> {
        config.validate()?;

        let header_name = HeaderName::from_bytes(config.header_name.to_ascii_lowercase().as_bytes())
            .map_err(|e| {
                GuardError::config_with_source(
                    format!("invalid csrf.header_name: {}", config.header_name),
                    e,
                )
            })?;

        let protected_methods = config
            .protected_methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|e| {
                    GuardError::config_with_source(format!("invalid protected method: {m}"), e)
                })
            })
            .collect::<Result<HashSet<_>>>()?;

        Ok(Self {
            codec: SignedTokenCodec::with_sources(&config.secret, clock, random)?,
            ttl: config.ttl(),
            header_name,
            cookie_name: config.cookie_name.clone(),
            protected_methods,
            exempt_path_prefixes: config.exempt_path_prefixes.clone(),
            secure_cookie: environment.is_production(),
        })
    }

    /// 该请求是否需要校验
    #[must_use]
    pub fn requires_validation(&self, method: &Method, path: &str) -> bool {
        self.protected_methods.contains(method)
            && !self
                .exempt_path_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// 校验请求；无需校验的请求直接通过
    #[must_use]
    pub fn validate<B>(&self, request: &Request<B>) -> bool {
        if !self.requires_validation(request.method(), request.uri().path()) {
            return true;
        }
        let passed = self.check_headers(request.headers());
        if !passed {
            ldebug!(
                "system",
                LogStage::CsrfCheck,
                LogComponent::Csrf,
                "csrf_rejected",
                "csrf validation failed",
                method = %request.method(),
                path = %request.uri().path()
            );
        }
        passed
    }

    /// 校验 Cookie 与请求头中的令牌
    #[must_use]
    pub fn check_headers(&self, headers: &HeaderMap) -> bool {
        let jar = CookieJar::from_headers(headers);
        let Some(cookie_token) = jar.get(&self.cookie_name).map(Cookie::value) else {
            return false;
        };
        let Some(header_token) = headers
            .get(&self.header_name)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };

        if cookie_token.is_empty()
            || cookie_token.len() != header_token.len()
            || !bool::from(cookie_token.as_bytes().ct_eq(header_token.as_bytes()))
        {
            return false;
        }

        self.codec.verify(cookie_token, self.ttl)
    }

    /// 签发新令牌
    #[must_use]
    pub fn issue(&self) -> String {
        self.codec.issue()
    }

    /// 构造下发令牌的 Cookie；前端脚本需要读取，因此不设 HttpOnly
    #[must_use]
    pub fn cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token.to_string()))
            .http_only(false)
            .secure(self.secure_cookie)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(time::Duration::seconds(
                i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX),
            ))
            .build()
    }

    /// `Set-Cookie` 头的值
    #[must_use]
    pub fn cookie_header_for(&self, token: &str) -> String {
        self.cookie(token).to_string()
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub const fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use axum::body::Body;
    use rstest::rstest;
    use std::sync::Arc;

    const SECRET: &str = "test-csrf-secret-32-bytes-long!!";

    fn config() -> CsrfConfig {
        CsrfConfig {
            secret: SECRET.to_string(),
            exempt_path_prefixes: vec!["/webhooks/".to_string()],
            ..CsrfConfig::default()
        }
    }

    fn guard() -> CsrfGuard {
        CsrfGuard::new(&config(), Environment::Development).unwrap()
    }

    fn request(method: &str, path: &str, cookie: Option<&str>, header: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = cookie {
            builder = builder.header("cookie", format!("theme=dark; csrf_token={token}"));
        }
        if let Some(token) = header {
            builder = builder.header("x-csrf-token", token);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[rstest]
    #[case("GET", "/api/items", false)]
    #[case("HEAD", "/api/items", false)]
    #[case("OPTIONS", "/api/items", false)]
    #[case("POST", "/api/items", true)]
    #[case("PUT", "/api/items/1", true)]
    #[case("PATCH", "/api/items/1", true)]
    #[case("DELETE", "/api/items/1", true)]
    #[case("POST", "/webhooks/stripe", false)]
    fn test_requires_validation(#[case] method: &str, #[case] path: &str, #[case] expected: bool) {
        let method = Method::from_bytes(method.as_bytes()).unwrap();
        assert_eq!(guard().requires_validation(&method, path), expected);
    }

    #[test]
    fn test_matching_tokens_pass() {
        let guard = guard();
        let token = guard.issue();
        assert!(guard.validate(&request("POST", "/api/items", Some(&token), Some(&token))));
    }

    #[test]
    fn test_missing_header_rejected() {
        let guard = guard();
        let token = guard.issue();
        assert!(!guard.validate(&request("POST", "/api/items", Some(&token), None)));
        assert!(!guard.validate(&request("POST", "/api/items", None, Some(&token))));
    }

    #[test]
    fn test_two_valid_but_different_tokens_rejected() {
        let guard = guard();
        let a = guard.issue();
        let b = guard.issue();
        assert!(!guard.validate(&request("DELETE", "/api/items/1", Some(&a), Some(&b))));
    }

    #[test]
    fn test_matching_but_forged_token_rejected() {
        let guard = guard();
        let forged = "lq2x9k.bm9uY2U.c2lnbmF0dXJl";
        assert!(!guard.validate(&request("POST", "/api/items", Some(forged), Some(forged))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let guard = CsrfGuard::with_sources(
            &config(),
            Environment::Development,
            clock.clone(),
            OsRandom::shared(),
        )
        .unwrap();
        let token = guard.issue();
        clock.advance(Duration::from_secs(86_401));
        assert!(!guard.validate(&request("POST", "/api/items", Some(&token), Some(&token))));
    }

    #[test]
    fn test_safe_methods_pass_without_tokens() {
        assert!(guard().validate(&request("GET", "/api/items", None, None)));
    }

    #[test]
    fn test_cookie_attributes() {
        let dev = guard();
        let header = dev.cookie_header_for("abc");
        assert!(header.starts_with("csrf_token=abc"));
        assert!(header.contains("SameSite=Strict"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Max-Age=86400"));
        assert!(!header.contains("HttpOnly"));
        assert!(!header.contains("Secure"));

        let prod = CsrfGuard::new(&config(), Environment::Production).unwrap();
        assert!(prod.cookie_header_for("abc").contains("Secure"));
    }

    #[test]
    fn test_invalid_method_is_configuration_error() {
        let config = CsrfConfig {
            protected_methods: vec!["PO ST".to_string()],
            ..config()
        };
        assert!(CsrfGuard::new(&config, Environment::Development).is_err());
    }
}
