//! # Request Guard 主程序
//!
//! 加载配置、初始化组件与后台任务，然后启动 HTTP 服务直到收到退出信号。

use clap::Parser;
use request_guard::{
    Result,
    app::{AppContext, AppTasks},
    config, http, lerror, linfo,
    logging::{self, LogComponent, LogStage},
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "request-guard", version, about)]
struct Cli {
    /// 配置文件路径（默认 `config/config.{RUST_ENV}.toml`）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件中的设置
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    logging::init_logging(Some(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
    ));

    let context = Arc::new(AppContext::from_config(config).await?);
    let shutdown = CancellationToken::new();

    let tasks = AppTasks::initialize(&context, shutdown.child_token()).await?;
    tasks.scheduler().start_all().await;

    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    let served = http::serve(Arc::clone(&context), shutdown.clone()).await;
    shutdown.cancel();
    tasks.scheduler().shutdown().await;

    if let Err(e) = &served {
        lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "service_failed",
            "服务异常退出",
            error = %e
        );
    } else {
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "service_shutdown",
            "服务正常关闭"
        );
    }
    served
}

/// 收到退出信号后取消令牌；无法监听信号时保持服务运行
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "signal_failed",
            "无法监听退出信号",
            error = %e
        );
        return;
    }
    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "signal_received",
        "收到退出信号，开始优雅关闭"
    );
    shutdown.cancel();
}
