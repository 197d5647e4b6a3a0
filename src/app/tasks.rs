use crate::app::context::AppContext;
use crate::app::task_scheduler::{ScheduledTask, TaskScheduler};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 过期交换记录回收间隔
pub const EXCHANGE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// 过期会话清理间隔
pub const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// 后台任务类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// 回收限流器中已空的窗口
    RateLimitCleanup,
    /// 回收未被消费的过期交换记录
    ExchangeSweep,
    /// 删除过期会话
    SessionPurge,
}

/// 后台任务集合
///
/// 所有任务都只做回收；停掉它们不影响请求路径上的正确性。
pub struct AppTasks {
    scheduler: Arc<TaskScheduler>,
}

impl AppTasks {
    /// 初始化调度器并注册所有后台任务
    pub async fn initialize(ctx: &AppContext, cancel: CancellationToken) -> Result<Arc<Self>> {
        let scheduler = Arc::new(TaskScheduler::new(cancel));

        let limiters = Arc::clone(&ctx.rate_limiters);
        let exchange_store = Arc::clone(&ctx.exchange_store);
        let sessions = Arc::clone(&ctx.sessions);

        scheduler
            .register_many(vec![
                ScheduledTask::builder(TaskType::RateLimitCleanup)
                    .on_start(move |cancel| limiters.spawn_cleanup(&cancel))
                    .build()?,
                ScheduledTask::periodic(TaskType::ExchangeSweep, EXCHANGE_SWEEP_INTERVAL, {
                    move || {
                        let store = Arc::clone(&exchange_store);
                        async move { store.sweep().await }
                    }
                }),
                ScheduledTask::periodic(TaskType::SessionPurge, SESSION_PURGE_INTERVAL, {
                    move || {
                        let sessions = Arc::clone(&sessions);
                        async move { sessions.purge_expired().await }
                    }
                }),
            ])
            .await;

        Ok(Arc::new(Self { scheduler }))
    }

    #[must_use]
    pub fn scheduler(&self) -> Arc<TaskScheduler> {
        Arc::clone(&self.scheduler)
    }
}
