//! 重载调度器模块
//!
//! 按固定间隔在后台触发加载周期。加载周期严格串行，
//! 失败不影响已发布的快照，关闭后不再发布任何新快照。

use crate::error::VaultConfigError;
use crate::source::provider::SourceCore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};

/// 调度器状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// 等待下一次触发
    Idle,
    /// 正在执行加载周期
    Loading,
    /// 已停止
    Stopped,
}

/// 调度器状态
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// 当前状态
    pub state: SchedulerState,
    /// 轮询间隔（秒）
    pub interval_seconds: u64,
    /// 成功完成的加载周期数
    pub cycles_completed: u64,
    /// 失败的加载周期数
    pub cycles_failed: u64,
    /// 发布新快照的次数
    pub changes_published: u64,
    /// 最后一次加载周期结束时间
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// 最后一次错误信息
    pub last_error: Option<String>,
}

impl SchedulerStatus {
    fn new(interval: Duration) -> Self {
        Self {
            state: SchedulerState::Idle,
            interval_seconds: interval.as_secs(),
            cycles_completed: 0,
            cycles_failed: 0,
            changes_published: 0,
            last_cycle_at: None,
            last_error: None,
        }
    }
}

/// 后台重载调度器
pub struct ReloadScheduler {
    /// 关闭信号发送器
    shutdown_tx: watch::Sender<bool>,
    /// 调度器状态
    status: Arc<RwLock<SchedulerStatus>>,
    /// 后台任务句柄
    handle: Option<JoinHandle<()>>,
}

impl ReloadScheduler {
    /// 启动调度器
    ///
    /// # 参数
    /// * `core` - 配置源的共享状态
    /// * `interval` - 轮询间隔
    ///
    /// # 返回
    /// * `Self` - 已在后台运行的调度器
    pub(crate) fn start(core: Arc<SourceCore>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = Arc::new(RwLock::new(SchedulerStatus::new(interval)));

        let span = core.span().clone();
        let task_status = Arc::clone(&status);
        let handle = tokio::spawn(
            Self::run_loop(core, interval, shutdown_rx, task_status).instrument(span),
        );

        Self {
            shutdown_tx,
            status,
            handle: Some(handle),
        }
    }

    /// 调度循环
    async fn run_loop(
        core: Arc<SourceCore>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
        status: Arc<RwLock<SchedulerStatus>>,
    ) {
        info!("配置重载调度器已启动，间隔: {:?}", interval);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown_rx.changed() => {
                    // 发送端被丢弃同样视为关闭
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if *shutdown_rx.borrow() {
                break;
            }

            status.write().await.state = SchedulerState::Loading;
            debug!("开始定时加载周期");

            let result = core.run_cycle(Some(&shutdown_rx)).await;

            let mut current = status.write().await;
            current.state = SchedulerState::Idle;
            current.last_cycle_at = Some(Utc::now());
            match result {
                Ok(report) => {
                    current.cycles_completed += 1;
                    current.last_error = None;
                    if report.applied > 0 {
                        current.changes_published += 1;
                    }
                }
                Err(VaultConfigError::Cancelled) => {
                    debug!("加载周期因关闭而放弃，不发布快照");
                    break;
                }
                Err(e) => {
                    current.cycles_failed += 1;
                    current.last_error = Some(e.to_string());
                    error!("定时加载失败，继续使用上一次的配置: {}", e);
                }
            }
        }

        status.write().await.state = SchedulerState::Stopped;
        info!("配置重载调度器已停止");
    }

    /// 停止调度器并等待后台任务结束
    ///
    /// 正在进行的存储请求会完成，但其结果不会被发布。
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("调度器任务异常退出: {}", e);
            }
        }
    }

    /// 获取调度器状态
    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// 调度器是否仍在运行
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ReloadScheduler {
    fn drop(&mut self) {
        // 不能在 Drop 中等待，只发出关闭信号
        let _ = self.shutdown_tx.send(true);
    }
}
