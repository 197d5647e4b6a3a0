//! # 数据库模块
//!
//! 数据库连接和迁移管理

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{lerror, linfo, lwarn};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

/// 连接 URL 中可能带有凭据，日志里只保留 scheme 与主机部分
fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) if parsed.password().is_some() => {
            let mut redacted = parsed;
            let _ = redacted.set_password(Some("***"));
            redacted.to_string()
        }
        _ => url.to_string(),
    }
}

/// 初始化数据库连接
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    config.ensure_database_path()?;

    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "connect",
        "正在连接数据库",
        url = %redact_url(&config.url)
    );

    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .sqlx_logging(false);

    // SQLite 内存库每个连接都是独立的数据库
    if config.is_memory_database() {
        options.max_connections(1).min_connections(1);
    }

    let db = Database::connect(options).await?;

    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "connected",
        "数据库连接成功"
    );
    Ok(db)
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "migrate",
        "开始运行数据库迁移..."
    );

    let pending = ::migration::Migrator::get_pending_migrations(db).await?;
    if !pending.is_empty() {
        lwarn!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "pending_migrations",
            "有待应用的迁移",
            count = pending.len()
        );
    }

    ::migration::Migrator::up(db, None).await.inspect_err(|e| {
        lerror!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "migrate_failed",
            "数据库迁移失败",
            error = %e
        );
    })?;

    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "migrated",
        "数据库迁移完成"
    );
    Ok(())
}
