//! # 后台任务调度器
//!
//! 统一注册、启动与停止后台清理任务。所有任务共享同一个 [`CancellationToken`]，
//! 优雅停机时取消令牌并等待任务退出。

use crate::app::tasks::TaskType;
use crate::config_error;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo, lwarn};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type SweepFuture = Pin<Box<dyn Future<Output = Result<usize>> + Send>>;
type SpawnAction = Arc<dyn Fn(CancellationToken) -> Vec<JoinHandle<()>> + Send + Sync>;

/// 调度任务定义
#[derive(Clone)]
pub struct ScheduledTask {
    task_type: TaskType,
    spawn: SpawnAction,
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("task_type", &self.task_type)
            .finish_non_exhaustive()
    }
}

impl ScheduledTask {
    /// 创建任务构建器
    #[must_use]
    pub fn builder(task_type: TaskType) -> ScheduledTaskBuilder {
        ScheduledTaskBuilder {
            task_type,
            spawn: None,
        }
    }

    /// 周期执行的清理任务；返回值为本轮回收数量
    pub fn periodic<F, Fut>(task_type: TaskType, period: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<usize>> + Send + 'static,
    {
        let action: Arc<dyn Fn() -> SweepFuture + Send + Sync> =
            Arc::new(move || Box::pin(action()));
        Self {
            task_type,
            spawn: Arc::new(move |cancel: CancellationToken| {
                vec![spawn_periodic(task_type, period, Arc::clone(&action), cancel)]
            }),
        }
    }

    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    fn start(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        linfo!(
            "system",
            LogStage::BackgroundTask,
            LogComponent::Scheduler,
            "task_start",
            "Starting background task",
            task = ?self.task_type
        );
        (self.spawn)(cancel)
    }
}

fn spawn_periodic(
    task_type: TaskType,
    period: Duration,
    action: Arc<dyn Fn() -> SweepFuture + Send + Sync>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => match action().await {
                    Ok(0) => {}
                    Ok(removed) => ldebug!(
                        "system",
                        LogStage::BackgroundTask,
                        LogComponent::Scheduler,
                        "sweep",
                        "background sweep reclaimed records",
                        task = ?task_type,
                        removed = removed
                    ),
                    Err(err) => lwarn!(
                        "system",
                        LogStage::BackgroundTask,
                        LogComponent::Scheduler,
                        "sweep_failed",
                        "background sweep failed",
                        task = ?task_type,
                        error = %err
                    ),
                },
            }
        }
    })
}

/// 任务构建器
pub struct ScheduledTaskBuilder {
    task_type: TaskType,
    spawn: Option<SpawnAction>,
}

impl ScheduledTaskBuilder {
    /// 注册启动逻辑：接收取消令牌，返回派生出的任务句柄
    #[must_use]
    pub fn on_start<F>(mut self, action: F) -> Self
    where
        F: Fn(CancellationToken) -> Vec<JoinHandle<()>> + Send + Sync + 'static,
    {
        self.spawn = Some(Arc::new(action));
        self
    }

    /// 构建最终任务
    pub fn build(self) -> Result<ScheduledTask> {
        let spawn = self
            .spawn
            .ok_or_else(|| config_error!("task {:?} has no start action", self.task_type))?;
        Ok(ScheduledTask {
            task_type: self.task_type,
            spawn,
        })
    }
}

/// 后台任务调度器
pub struct TaskScheduler {
    tasks: RwLock<Vec<ScheduledTask>>,
    running: Mutex<Vec<(TaskType, JoinHandle<()>)>>,
    cancel: CancellationToken,
}

impl TaskScheduler {
    /// 创建新的调度器
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            running: Mutex::new(Vec::new()),
            cancel,
        }
    }

    /// 共享的取消令牌
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 注册任务
    pub async fn register(&self, task: ScheduledTask) {
        self.tasks.write().await.push(task);
    }

    /// 批量注册任务
    pub async fn register_many(&self, tasks: Vec<ScheduledTask>) {
        self.tasks.write().await.extend(tasks);
    }

    /// 启动所有任务
    pub async fn start_all(&self) {
        let tasks = { self.tasks.read().await.clone() };
        let mut running = self.running.lock().await;
        for task in tasks {
            let task_type = task.task_type();
            running.extend(
                task.start(self.cancel.child_token())
                    .into_iter()
                    .map(|handle| (task_type, handle)),
            );
        }
    }

    /// 正在运行的任务句柄数量
    pub async fn running_count(&self) -> usize {
        self.running.lock().await.len()
    }

    /// 取消所有任务并等待退出
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = std::mem::take(&mut *self.running.lock().await);
        for (task_type, handle) in handles {
            if let Err(err) = handle.await {
                lerror!(
                    "system",
                    LogStage::Shutdown,
                    LogComponent::Scheduler,
                    "task_stop_failed",
                    "Background task failed to stop cleanly",
                    task = ?task_type,
                    error = %err
                );
            }
        }
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Scheduler,
            "tasks_stopped",
            "All background tasks stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builder_requires_start_action() {
        assert!(ScheduledTask::builder(TaskType::SessionPurge).build().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_runs_until_shutdown() {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = TaskScheduler::new(CancellationToken::new());
        scheduler
            .register(ScheduledTask::periodic(
                TaskType::ExchangeSweep,
                Duration::from_secs(10),
                {
                    let runs = Arc::clone(&runs);
                    move || {
                        let runs = Arc::clone(&runs);
                        async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            Ok(0)
                        }
                    }
                },
            ))
            .await;

        scheduler.start_all().await;
        assert_eq!(scheduler.running_count().await, 1);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        scheduler.shutdown().await;
        assert_eq!(scheduler.running_count().await, 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_builder_task_receives_cancellation() {
        let scheduler = TaskScheduler::new(CancellationToken::new());
        let task = ScheduledTask::builder(TaskType::RateLimitCleanup)
            .on_start(|cancel| vec![tokio::spawn(async move { cancel.cancelled().await })])
            .build()
            .unwrap();
        scheduler.register(task).await;
        scheduler.start_all().await;
        scheduler.shutdown().await;
    }
}
