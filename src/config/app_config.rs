//! # 应用配置结构定义

use super::DatabaseConfig;
use crate::auth::oauth_client::OAuthConfig;
use crate::auth::session::SessionConfig;
use crate::ensure_config;
use crate::error::Result;
use crate::security::csrf::CsrfConfig;
use crate::security::rate_limit::RouteRateLimitConfig;
use serde::{Deserialize, Serialize};

/// 运行环境，决定 Cookie 的 `Secure` 与 `SameSite` 属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// 本地开发
    #[default]
    #[serde(alias = "dev")]
    Development,
    /// 生产环境
    #[serde(alias = "prod")]
    Production,
}

impl Environment {
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// 从字符串解析，未知值返回 `None`
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Self::Development),
            "prod" | "production" => Some(Self::Production),
            _ => None,
        }
    }
}

/// 应用主配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub csrf: CsrfConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// 监听地址
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 一次性交换存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeBackend {
    /// 进程内存
    #[default]
    Memory,
    /// Redis
    Redis,
}

/// 会话与账户绑定存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    /// 进程内存
    Memory,
    /// 关系数据库
    #[default]
    Database,
}

/// 存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub exchange_backend: ExchangeBackend,
    pub session_backend: PersistenceBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
}

/// Redis配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis连接URL
    pub url: String,
    /// 键前缀
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            key_prefix: "request_guard:".to_string(),
        }
    }
}

/// 限流配置：按路径前缀组合，先匹配者生效
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub routes: Vec<RouteRateLimitConfig>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            routes: vec![
                RouteRateLimitConfig::new("/oauth", 20, 60),
                RouteRateLimitConfig::new("/api", 300, 60),
            ],
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// 以给定 CSRF 密钥构造其余取默认值的配置
    #[must_use]
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            environment: Environment::default(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            store: StoreConfig::default(),
            csrf: CsrfConfig {
                secret: secret.into(),
                ..CsrfConfig::default()
            },
            session: SessionConfig::default(),
            rate_limit: RateLimitSettings::default(),
            oauth: None,
            logging: LoggingConfig::default(),
        }
    }

    /// 用环境变量覆盖敏感项
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// 用给定的查找函数覆盖敏感项
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("REQUEST_GUARD_CSRF_SECRET") {
            self.csrf.secret = secret;
        }
        if let Some(url) = lookup("REQUEST_GUARD_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(env) = lookup("REQUEST_GUARD_ENV").as_deref().and_then(Environment::parse) {
            self.environment = env;
        }
        if let (Some(oauth), Some(secret)) =
            (self.oauth.as_mut(), lookup("REQUEST_GUARD_OAUTH_CLIENT_SECRET"))
        {
            oauth.client_secret = Some(secret);
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        ensure_config!(self.server.port != 0, "server.port must be greater than 0");

        self.csrf.validate()?;
        self.session.validate()?;

        if self.rate_limit.enabled {
            for route in &self.rate_limit.routes {
                route.validate()?;
            }
        }

        if let Some(oauth) = &self.oauth {
            oauth.validate()?;
        }

        if self.store.exchange_backend == ExchangeBackend::Redis {
            let redis = self.store.redis.as_ref();
            ensure_config!(
                redis.is_some_and(|r| !r.url.is_empty()),
                "store.redis.url must be set when exchange_backend = \"redis\""
            );
        }

        if self.store.session_backend == PersistenceBackend::Database {
            ensure_config!(
                !self.database.url.is_empty(),
                "database.url cannot be empty"
            );
            ensure_config!(
                self.database.max_connections > 0,
                "database.max_connections must be greater than 0"
            );
        }

        Ok(())
    }
}
