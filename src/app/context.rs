//! 应用上下文（DI 容器）
//!
//! 统一持有跨模块共享的组件实例，便于在测试中注入内存存储与手动时钟。

use crate::auth::{OAuthPkceFlow, SessionAuthenticator};
use crate::config::{AppConfig, ExchangeBackend, PersistenceBackend};
use crate::config_error;
use crate::database::{init_database, run_migrations};
use crate::error::Result;
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use crate::security::{CsrfGuard, RouteRateLimitConfig, RouteRateLimiters};
use crate::store::{
    AccountLinkStore, ExchangeStore, MemoryAccountLinkStore, MemoryExchangeStore,
    MemorySessionStore, RedisExchangeStore, SeaOrmAccountLinkStore, SeaOrmSessionStore,
    SessionStore,
};
use crate::utils::clock::{SharedClock, SystemClock};
use crate::utils::random::{OsRandom, SharedRandom};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub clock: SharedClock,
    pub csrf: Arc<CsrfGuard>,
    pub rate_limiters: Arc<RouteRateLimiters>,
    pub sessions: Arc<SessionAuthenticator>,
    pub exchange_store: Arc<dyn ExchangeStore>,
    pub oauth: Option<Arc<OAuthPkceFlow>>,
    pub db: Option<DatabaseConnection>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("environment", &self.config.environment)
            .field("oauth_enabled", &self.oauth.is_some())
            .field("database", &self.db.is_some())
            .finish_non_exhaustive()
    }
}

/// 持久化存储组合
struct Persistence {
    sessions: Arc<dyn SessionStore>,
    links: Arc<dyn AccountLinkStore>,
    db: Option<DatabaseConnection>,
}

impl AppContext {
    /// 按配置构建所有组件
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        Self::from_config_with_sources(config, SystemClock::shared(), OsRandom::shared()).await
    }

    /// 按配置构建，时钟与随机源由调用方注入
    pub async fn from_config_with_sources(
        config: AppConfig,
        clock: SharedClock,
        random: SharedRandom,
    ) -> Result<Self> {
        config.validate()?;
        let environment = config.environment;

        let persistence = Self::persistence(&config).await?;
        let exchange_store = Self::exchange_store(&config, &clock).await?;

        let csrf = Arc::new(CsrfGuard::with_sources(
            &config.csrf,
            environment,
            clock.clone(),
            random.clone(),
        )?);

        let routes: &[RouteRateLimitConfig] = if config.rate_limit.enabled {
            config.rate_limit.routes.as_slice()
        } else {
            &[]
        };
        let rate_limiters = Arc::new(RouteRateLimiters::new(routes, &clock)?);

        let sessions = Arc::new(SessionAuthenticator::with_sources(
            persistence.sessions,
            config.session.clone(),
            config.csrf.cookie_name.clone(),
            environment,
            clock.clone(),
            random.clone(),
        )?);

        let oauth = config
            .oauth
            .clone()
            .map(|oauth| {
                OAuthPkceFlow::with_sources(
                    oauth,
                    exchange_store.clone(),
                    Some(persistence.links.clone()),
                    clock.clone(),
                    random.clone(),
                )
                .map(Arc::new)
            })
            .transpose()?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "context_ready",
            "应用组件初始化完成",
            environment = ?environment,
            session_backend = ?config.store.session_backend,
            exchange_backend = ?config.store.exchange_backend,
            oauth_enabled = oauth.is_some(),
            rate_limit_rules = routes.len()
        );

        Ok(Self {
            config: Arc::new(config),
            clock,
            csrf,
            rate_limiters,
            sessions,
            exchange_store,
            oauth,
            db: persistence.db,
        })
    }

    async fn persistence(config: &AppConfig) -> Result<Persistence> {
        match config.store.session_backend {
            PersistenceBackend::Memory => Ok(Persistence {
                sessions: Arc::new(MemorySessionStore::new()),
                links: Arc::new(MemoryAccountLinkStore::new()),
                db: None,
            }),
            PersistenceBackend::Database => {
                let db = init_database(&config.database).await?;
                run_migrations(&db).await?;
                Ok(Persistence {
                    sessions: Arc::new(SeaOrmSessionStore::new(db.clone())),
                    links: Arc::new(SeaOrmAccountLinkStore::new(db.clone())),
                    db: Some(db),
                })
            }
        }
    }

    async fn exchange_store(
        config: &AppConfig,
        clock: &SharedClock,
    ) -> Result<Arc<dyn ExchangeStore>> {
        match config.store.exchange_backend {
            ExchangeBackend::Memory => Ok(Arc::new(MemoryExchangeStore::with_clock(clock.clone()))),
            ExchangeBackend::Redis => {
                let redis = config
                    .store
                    .redis
                    .as_ref()
                    .ok_or_else(|| config_error!("store.redis is required for the redis backend"))?;
                let store = RedisExchangeStore::connect(&redis.url, redis.key_prefix.clone()).await?;
                Ok(Arc::new(store))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::OAuthConfig;

    const SECRET: &str = "context-test-secret-0123456789ab";

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::with_secret(SECRET);
        config.store.session_backend = PersistenceBackend::Memory;
        config
    }

    #[tokio::test]
    async fn test_memory_context() {
        let ctx = AppContext::from_config(memory_config()).await.unwrap();
        assert!(ctx.db.is_none());
        assert!(ctx.oauth.is_none());
        assert!(!ctx.rate_limiters.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_disabled_has_no_rules() {
        let mut config = memory_config();
        config.rate_limit.enabled = false;
        let ctx = AppContext::from_config(config).await.unwrap();
        assert!(ctx.rate_limiters.is_empty());
    }

    #[tokio::test]
    async fn test_database_context_runs_migrations() {
        let mut config = AppConfig::with_secret(SECRET);
        config.database.url = "sqlite::memory:".to_string();
        let ctx = AppContext::from_config(config).await.unwrap();
        assert!(ctx.db.is_some());

        let session = ctx.sessions.create_session("owner-1", None).await.unwrap();
        assert_eq!(session.owner_id, "owner-1");
    }

    #[tokio::test]
    async fn test_oauth_flow_built_when_configured() {
        let mut config = memory_config();
        config.oauth = Some(OAuthConfig {
            client_id: "client".to_string(),
            authorize_url: "https://idp.example.com/authorize".to_string(),
            token_url: "https://idp.example.com/token".to_string(),
            redirect_uri: "http://localhost:8080/oauth/callback".to_string(),
            ..OAuthConfig::default()
        });
        let ctx = AppContext::from_config(config).await.unwrap();
        assert!(ctx.oauth.is_some());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = AppConfig::with_secret("short");
        assert!(AppContext::from_config(config).await.is_err());
    }
}
