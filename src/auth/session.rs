//! # 会话认证
//!
//! 会话 Cookie 解析为身份，并实现滑动续期：剩余有效期低于
//! `lifetime × renewal_threshold` 时，在存储中以单次条件更新延长过期时间。
//!
//! 续期时 CSRF Cookie 原样从请求中读取后回写，不重新签发。

use crate::config::Environment;
use crate::credential_error;
use crate::ensure_config;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::store::SessionStore;
use crate::types::{Identity, Session};
use crate::utils::clock::{SharedClock, SystemClock, duration_ms};
use crate::utils::random::{OsRandom, SharedRandom, random_token};
use crate::{ldebug, lwarn};
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 会话令牌随机字节数
const SESSION_TOKEN_BYTES: usize = 32;

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// 会话有效期（秒），默认 7 天
    pub lifetime_secs: u64,
    /// 剩余有效期占比低于该值时续期
    pub renewal_threshold: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session_token".to_string(),
            lifetime_secs: 7 * 24 * 60 * 60,
            renewal_threshold: 0.5,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_config!(
            !self.cookie_name.is_empty(),
            "session.cookie_name cannot be empty"
        );
        ensure_config!(
            self.lifetime_secs > 0,
            "session.lifetime_secs must be greater than 0"
        );
        ensure_config!(
            self.renewal_threshold > 0.0 && self.renewal_threshold < 1.0,
            "session.renewal_threshold must be in (0, 1), got {}",
            self.renewal_threshold
        );
        Ok(())
    }

    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    /// 触发续期的剩余时长（毫秒）
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn renewal_window_ms(&self) -> i64 {
        (duration_ms(self.lifetime()) as f64 * self.renewal_threshold) as i64
    }
}

/// 续期结果，由 HTTP 层转换为 `Set-Cookie`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRenewal {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub max_age_secs: u64,
    /// 请求中原有的 CSRF Cookie 值
    pub csrf_token: Option<String>,
}

/// 认证结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub identity: Identity,
    pub renewal: Option<SessionRenewal>,
}

/// 会话认证器
#[derive(Clone)]
pub struct SessionAuthenticator {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
    csrf_cookie_name: String,
    environment: Environment,
    clock: SharedClock,
    random: SharedRandom,
}

impl std::fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuthenticator")
            .field("config", &self.config)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl SessionAuthenticator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        config: SessionConfig,
        csrf_cookie_name: impl Into<String>,
        environment: Environment,
    ) -> Result<Self> {
        Self::with_sources(
            store,
            config,
            csrf_cookie_name,
            environment,
            SystemClock::shared(),
            OsRandom::shared(),
        )
    }

    pub fn with_sources(
        store: Arc<dyn SessionStore>,
        config: SessionConfig,
        csrf_cookie_name: impl Into<String>,
        environment: Environment,
        clock: SharedClock,
        random: SharedRandom,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            csrf_cookie_name: csrf_cookie_name.into(),
            environment,
            clock,
            random,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 从请求头解析会话
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Authenticated> {
        let jar = CookieJar::from_headers(headers);
        let Some(token) = jar
            .get(&self.config.cookie_name)
            .map(Cookie::value)
            .filter(|v| !v.is_empty())
        else {
            return Err(credential_error!("missing credential"));
        };

        let Some(session) = self.store.find(token).await? else {
            ldebug!(
                "system",
                LogStage::Authentication,
                LogComponent::Session,
                "session_not_found",
                "no session for presented cookie"
            );
            return Err(credential_error!("invalid or expired session"));
        };

        let now_ms = self.clock.now_ms();
        let now = self.clock.now();

        if session.is_expired_at(now) {
            if let Err(e) = self.store.delete(token).await {
                lwarn!(
                    "system",
                    LogStage::Authentication,
                    LogComponent::Session,
                    "expired_session_delete_failed",
                    "failed to delete expired session",
                    error = %e
                );
            }
            ldebug!(
                "system",
                LogStage::Authentication,
                LogComponent::Session,
                "session_expired",
                "session expired",
                owner_id = %session.owner_id
            );
            return Err(credential_error!("invalid or expired session"));
        }

        let mut identity = Identity::from(&session);
        let remaining_ms = session.expires_at.timestamp_millis().saturating_sub(now_ms);

        if remaining_ms >= self.config.renewal_window_ms() {
            return Ok(Authenticated {
                identity,
                renewal: None,
            });
        }

        let new_expires_at = self.expiry_from(now_ms);
        if !self.store.extend_expiry(token, now, new_expires_at).await? {
            ldebug!(
                "system",
                LogStage::Authentication,
                LogComponent::Session,
                "session_renewal_missed",
                "session vanished or expired before renewal",
                owner_id = %session.owner_id
            );
            return Err(credential_error!("invalid or expired session"));
        }

        ldebug!(
            "system",
            LogStage::Authentication,
            LogComponent::Session,
            "session_renewed",
            "session expiry extended",
            owner_id = %session.owner_id
        );

        identity.expires_at = new_expires_at;
        Ok(Authenticated {
            identity,
            renewal: Some(SessionRenewal {
                token: token.to_string(),
                expires_at: new_expires_at,
                max_age_secs: self.config.lifetime_secs,
                csrf_token: jar
                    .get(&self.csrf_cookie_name)
                    .map(|c| c.value().to_string()),
            }),
        })
    }

    /// 创建新会话
    pub async fn create_session(&self, owner_id: &str, scope_id: Option<&str>) -> Result<Session> {
        let now_ms = self.clock.now_ms();
        let session = Session {
            token: random_token(self.random.as_ref(), SESSION_TOKEN_BYTES),
            owner_id: owner_id.to_string(),
            current_scope_id: scope_id.map(ToString::to_string),
            expires_at: self.expiry_from(now_ms),
            created_at: self.clock.now(),
        };
        self.store.insert(&session).await?;
        Ok(session)
    }

    /// 注销
    pub async fn revoke(&self, token: &str) -> Result<()> {
        self.store.delete(token).await
    }

    /// 清理过期会话
    pub async fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired(self.clock.now()).await
    }

    fn expiry_from(&self, now_ms: i64) -> DateTime<Utc> {
        let expires_ms = now_ms.saturating_add(duration_ms(self.config.lifetime()));
        DateTime::from_timestamp_millis(expires_ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// 会话 Cookie
    #[must_use]
    pub fn session_cookie(&self, token: &str, max_age_secs: u64) -> Cookie<'static> {
        let same_site = if self.environment.is_production() {
            SameSite::Strict
        } else {
            SameSite::Lax
        };
        Cookie::build((self.config.cookie_name.clone(), token.to_string()))
            .http_only(true)
            .secure(self.environment.is_production())
            .same_site(same_site)
            .path("/")
            .max_age(time::Duration::seconds(
                i64::try_from(max_age_secs).unwrap_or(i64::MAX),
            ))
            .build()
    }

    /// 新会话的 `Set-Cookie` 值
    #[must_use]
    pub fn session_cookie_header(&self, session: &Session) -> String {
        self.session_cookie(&session.token, self.config.lifetime_secs)
            .to_string()
    }

    /// 续期后的会话 `Set-Cookie` 值
    #[must_use]
    pub fn renewal_cookie_header(&self, renewal: &SessionRenewal) -> String {
        self.session_cookie(&renewal.token, renewal.max_age_secs)
            .to_string()
    }

    /// 清除会话 Cookie
    #[must_use]
    pub fn clear_session_cookie_header(&self) -> String {
        self.session_cookie("", 0).to_string()
    }

    /// 请求中的会话令牌
    #[must_use]
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        CookieJar::from_headers(headers)
            .get(&self.config.cookie_name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuardError;
    use crate::store::MemorySessionStore;
    use crate::utils::clock::{Clock, ManualClock};
    use axum::http::HeaderValue;
    use pretty_assertions::assert_eq;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemorySessionStore>,
        auth: SessionAuthenticator,
    }

    fn fixture(environment: Environment) -> Fixture {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemorySessionStore::new());
        let auth = SessionAuthenticator::with_sources(
            store.clone(),
            SessionConfig::default(),
            "csrf_token",
            environment,
            clock.clone(),
            OsRandom::shared(),
        )
        .unwrap();
        Fixture { clock, store, auth }
    }

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_str(cookie).unwrap());
        headers
    }

    fn credential_message(err: GuardError) -> String {
        match err {
            GuardError::Credential { message } => message,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_cookie() {
        let f = fixture(Environment::Development);
        let err = f.auth.authenticate(&HeaderMap::new()).await.unwrap_err();
        assert_eq!(credential_message(err), "missing credential");
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let f = fixture(Environment::Development);
        let err = f
            .auth
            .authenticate(&headers("session_token=nope"))
            .await
            .unwrap_err();
        assert_eq!(credential_message(err), "invalid or expired session");
    }

    #[tokio::test]
    async fn test_fresh_session_is_not_renewed() {
        let f = fixture(Environment::Development);
        let session = f.auth.create_session("owner-1", Some("scope-1")).await.unwrap();

        let result = f
            .auth
            .authenticate(&headers(&format!("session_token={}", session.token)))
            .await
            .unwrap();
        assert_eq!(result.identity.owner_id, "owner-1");
        assert_eq!(result.identity.current_scope_id.as_deref(), Some("scope-1"));
        assert!(result.renewal.is_none());
    }

    #[tokio::test]
    async fn test_renewal_below_threshold_keeps_csrf_cookie() {
        let f = fixture(Environment::Development);
        let session = f.auth.create_session("owner-1", None).await.unwrap();

        f.clock.advance(DAY * 4);
        let result = f
            .auth
            .authenticate(&headers(&format!(
                "csrf_token=csrf-abc; session_token={}",
                session.token
            )))
            .await
            .unwrap();

        let renewal = result.renewal.expect("renewal expected");
        assert_eq!(renewal.token, session.token);
        assert_eq!(renewal.csrf_token.as_deref(), Some("csrf-abc"));
        assert_eq!(renewal.max_age_secs, 7 * 24 * 60 * 60);
        assert_eq!(
            renewal.expires_at.timestamp_millis(),
            f.clock.now_ms() + duration_ms(DAY * 7)
        );
        assert_eq!(result.identity.expires_at, renewal.expires_at);

        let stored = f.store.find(&session.token).await.unwrap().unwrap();
        assert_eq!(stored.expires_at, renewal.expires_at);
    }

    #[tokio::test]
    async fn test_renewal_starts_just_below_threshold() {
        let f = fixture(Environment::Development);
        let session = f.auth.create_session("owner-1", None).await.unwrap();
        let cookie = headers(&format!("session_token={}", session.token));

        // 剩余时间恰好等于 lifetime × threshold：不续期
        f.clock.advance(Duration::from_secs(7 * 24 * 60 * 60 / 2));
        let at_threshold = f.auth.authenticate(&cookie).await.unwrap();
        assert!(at_threshold.renewal.is_none());
        assert_eq!(at_threshold.identity.expires_at, session.expires_at);

        f.clock.advance(Duration::from_millis(1));
        let past_threshold = f.auth.authenticate(&cookie).await.unwrap();
        assert!(past_threshold.renewal.is_some());
    }

    #[tokio::test]
    async fn test_expired_session_is_deleted() {
        let f = fixture(Environment::Development);
        let session = f.auth.create_session("owner-1", None).await.unwrap();

        f.clock.advance(DAY * 8);
        let err = f
            .auth
            .authenticate(&headers(&format!("session_token={}", session.token)))
            .await
            .unwrap_err();
        assert_eq!(credential_message(err), "invalid or expired session");
        assert!(f.store.find(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke() {
        let f = fixture(Environment::Development);
        let session = f.auth.create_session("owner-1", None).await.unwrap();
        f.auth.revoke(&session.token).await.unwrap();
        assert!(
            f.auth
                .authenticate(&headers(&format!("session_token={}", session.token)))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_cookie_attributes_follow_environment() {
        let dev = fixture(Environment::Development);
        let session = dev.auth.create_session("owner-1", None).await.unwrap();
        let header = dev.auth.session_cookie_header(&session);
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Max-Age=604800"));
        assert!(!header.contains("Secure"));

        let prod = fixture(Environment::Production);
        let header = prod.auth.session_cookie_header(&session);
        assert!(header.contains("SameSite=Strict"));
        assert!(header.contains("Secure"));

        assert!(dev.auth.clear_session_cookie_header().contains("Max-Age=0"));
    }

    #[test]
    fn test_threshold_validation() {
        for threshold in [0.0, 1.0, -0.5, 1.5] {
            let config = SessionConfig {
                renewal_threshold: threshold,
                ..SessionConfig::default()
            };
            assert!(config.validate().is_err(), "threshold {threshold}");
        }
    }
}
