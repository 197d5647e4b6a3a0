//! # 配置管理模块
//!
//! 处理应用配置加载、环境变量覆盖与验证

mod app_config;
mod database;

pub use app_config::{
    AppConfig, Environment, ExchangeBackend, LoggingConfig, PersistenceBackend, RateLimitSettings,
    RedisConfig, ServerConfig, StoreConfig,
};
pub use database::DatabaseConfig;

use crate::error::{GuardError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use std::env;
use std::path::{Path, PathBuf};

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "REQUEST_GUARD_CONFIG_PATH";

/// 解析配置文件路径：显式路径 > 环境变量 > `config/config.{RUST_ENV}.toml`
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    PathBuf::from(format!("config/config.{env}.toml"))
}

/// 从 TOML 文本解析配置（不做环境变量覆盖）
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// 加载配置文件
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let config_file = resolve_config_path(explicit);

    if !config_file.exists() {
        return Err(GuardError::config(format!(
            "配置文件不存在: {}",
            config_file.display()
        )));
    }

    let content = std::fs::read_to_string(&config_file).map_err(|e| {
        GuardError::config_with_source(format!("读取配置文件失败: {}", config_file.display()), e)
    })?;

    let mut config: AppConfig = toml::from_str(&content)?;
    config.apply_env_overrides();
    config.validate()?;

    linfo!(
        "system",
        LogStage::Configuration,
        LogComponent::Config,
        "config_loaded",
        &format!("配置加载完成: {}", config_file.display()),
        environment = ?config.environment
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn minimal() -> String {
        format!("[csrf]\nsecret = \"{SECRET}\"\n")
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(&minimal()).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.csrf.header_name, "X-CSRF-Token");
        assert_eq!(config.csrf.ttl_secs, 86_400);
        assert_eq!(config.session.cookie_name, "session_token");
        assert!((config.session.renewal_threshold - 0.5).abs() < f64::EPSILON);
        assert!(config.rate_limit.enabled);
        assert!(config.oauth.is_none());
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = parse_config("[csrf]\nsecret = \"short\"\n").unwrap_err();
        assert!(matches!(err, GuardError::Config { .. }));
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let content = format!(
            "{}\n[rate_limit]\nenabled = true\n[[rate_limit.routes]]\nprefix = \"/api\"\nmax_requests = 0\nwindow_secs = 60\n",
            minimal()
        );
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let content = format!("{}\n[store]\nexchange_backend = \"redis\"\n", minimal());
        assert!(parse_config(&content).is_err());

        let content = format!(
            "{}\n[store]\nexchange_backend = \"redis\"\n[store.redis]\nurl = \"redis://localhost:6379/1\"\n",
            minimal()
        );
        assert!(parse_config(&content).is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = parse_config(&minimal()).unwrap();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("REQUEST_GUARD_CSRF_SECRET", "overridden-secret-with-32-chars!!"),
            ("REQUEST_GUARD_ENV", "prod"),
            ("REQUEST_GUARD_DATABASE_URL", "sqlite::memory:"),
        ]);
        config.apply_overrides_from(|name| vars.get(name).map(ToString::to_string));

        assert_eq!(config.csrf.secret, "overridden-secret-with-32-chars!!");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.database.url, "sqlite::memory:");
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(minimal().as_bytes()).unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_bundled_dev_config_parses() {
        let config = parse_config(include_str!("../../config/config.dev.toml")).unwrap();
        assert_eq!(config.rate_limit.routes.len(), 2);
        assert_eq!(config.rate_limit.routes[0].prefix, "/oauth");
        assert_eq!(
            config.oauth.as_ref().map(|o| o.route_prefix.as_str()),
            Some("/oauth")
        );
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load_config(Some(Path::new("/nonexistent/config.toml"))).unwrap_err();
        assert!(matches!(err, GuardError::Config { .. }));
    }
}
