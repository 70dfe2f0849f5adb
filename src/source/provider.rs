//! Vault 配置提供者
//!
//! 组合枚举、版本追踪与展开，构建并原子发布配置快照。
//! 读路径只有一次原子加载，不需要任何锁。

use crate::config::types::{GlobalConfig, SourceConfig};
use crate::error::{Result, VaultConfigError};
use crate::source::enumerator::PathEnumerator;
use crate::source::flatten::{KeyFormat, DEFAULT_SEPARATOR};
use crate::source::scheduler::{ReloadScheduler, SchedulerStatus};
use crate::source::signal::ChangeSignal;
use crate::source::snapshot::Snapshot;
use crate::source::version::VersionTracker;
use crate::store::vault::DEFAULT_MOUNT_POINT;
use crate::store::{SecretStore, VaultStore, VaultStoreSettings};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// 配置消费者接口
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// 当前已发布的快照
    fn current_snapshot(&self) -> Arc<Snapshot>;

    /// 获取当前的变更信号
    fn watch_for_change(&self) -> ChangeSignal;

    /// 立即执行一次加载周期
    ///
    /// 首次加载失败时返回错误；之后的失败只记录日志并保留上一次的快照。
    async fn trigger_reload(&self) -> Result<ReloadOutcome>;
}

/// 手动加载的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// 有密钥更新，已发布新快照
    Changed { applied: usize, generation: u64 },
    /// 没有密钥更新
    Unchanged,
    /// 加载失败，继续使用上一次的快照
    Failed,
}

/// 配置源选项
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// 配置源名称
    pub name: String,
    /// 根路径
    pub base_path: String,
    /// KV 引擎挂载点
    pub mount_point: String,
    /// 轮询间隔，`None` 表示不进行后台轮询
    pub reload_interval: Option<Duration>,
    /// 键生成规则
    pub key_format: KeyFormat,
    /// 根路径只作为目录处理
    pub base_path_is_folder: bool,
}

impl SourceOptions {
    /// 创建默认选项
    pub fn new(name: &str, base_path: &str) -> Self {
        Self {
            name: name.to_string(),
            base_path: base_path.to_string(),
            mount_point: DEFAULT_MOUNT_POINT.to_string(),
            reload_interval: None,
            key_format: KeyFormat::default(),
            base_path_is_folder: false,
        }
    }

    /// 由配置文件中的配置源生成选项
    pub fn from_config(source: &SourceConfig) -> Self {
        let reload_interval = if source.reload_on_change && source.reload_interval_seconds > 0 {
            Some(Duration::from_secs(source.reload_interval_seconds))
        } else {
            None
        };

        Self {
            name: source.name.clone(),
            base_path: source.base_path.clone(),
            mount_point: source.mount_point.clone(),
            reload_interval,
            key_format: KeyFormat {
                separator: DEFAULT_SEPARATOR,
                normalize_chars: source.additional_path_characters.chars().collect(),
                key_prefix: source.key_prefix.clone().filter(|p| !p.is_empty()),
                omit_secret_path: source.omit_secret_path,
            },
            base_path_is_folder: source.base_path_is_folder,
        }
    }

    /// 设置轮询间隔，0 表示禁用
    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = if interval.is_zero() {
            None
        } else {
            Some(interval)
        };
        self
    }

    /// 设置键生成规则
    pub fn with_key_format(mut self, key_format: KeyFormat) -> Self {
        self.key_format = key_format;
        self
    }
}

/// 一次加载周期的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// 枚举到的密钥数量
    pub seen: usize,
    /// 应用到快照的密钥数量
    pub applied: usize,
    /// 因格式错误跳过的密钥数量
    pub skipped: usize,
    /// 周期结束后的快照代数
    pub generation: u64,
}

/// 同时发布的快照与变更信号
struct Published {
    snapshot: Arc<Snapshot>,
    signal: ChangeSignal,
}

/// 只由加载周期持有的状态
#[derive(Debug, Default)]
struct SourceState {
    tracker: VersionTracker,
}

/// 配置源的共享核心，由提供者与调度器共同持有
pub(crate) struct SourceCore {
    options: SourceOptions,
    store: Arc<dyn SecretStore>,
    published: ArcSwap<Published>,
    state: Mutex<SourceState>,
    loaded: AtomicBool,
    span: Span,
}

impl SourceCore {
    fn new(options: SourceOptions, store: Arc<dyn SecretStore>) -> Self {
        let span = info_span!(
            "vault_source",
            name = %options.name,
            mount = %options.mount_point,
            base_path = %options.base_path
        );

        Self {
            options,
            store,
            published: ArcSwap::from_pointee(Published {
                snapshot: Arc::new(Snapshot::empty()),
                signal: ChangeSignal::new(),
            }),
            state: Mutex::new(SourceState::default()),
            loaded: AtomicBool::new(false),
            span,
        }
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.published.load().snapshot)
    }

    fn signal(&self) -> ChangeSignal {
        self.published.load().signal.clone()
    }

    /// 执行一次完整的加载周期
    ///
    /// # 参数
    /// * `cancel` - 调度器的关闭信号；收到关闭后不发布任何结果
    ///
    /// # 返回
    /// * `Result<CycleReport>` - 周期统计
    pub(crate) async fn run_cycle(
        &self,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<CycleReport> {
        self.cycle(cancel).instrument(self.span.clone()).await
    }

    async fn cycle(&self, cancel: Option<&watch::Receiver<bool>>) -> Result<CycleReport> {
        // 持有状态锁期间其他加载周期只能等待
        let mut state = self.state.lock().await;

        let previous = self.published.load_full();
        let mut builder = previous.snapshot.to_builder();
        let mut staged = state.tracker.clone();
        let key_format = &self.options.key_format;

        let mut enumerator = PathEnumerator::new(Arc::clone(&self.store))
            .root_is_folder(self.options.base_path_is_folder);
        if let Some(cancel) = cancel {
            enumerator = enumerator.with_cancel(cancel.clone());
        }
        let mut nodes = Box::pin(enumerator.enumerate(&self.options.base_path));

        let mut seen = 0;
        let mut skipped = 0;
        while let Some(item) = nodes.next().await {
            let node = match item {
                Ok(node) => node,
                Err(e) if e.is_malformed() => {
                    warn!("跳过无法解析的密钥: {}", e);
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            seen += 1;
            debug!("获取到 Vault 密钥 `{}`，版本 {}", node.path, node.version);

            if !staged.should_apply(&node.path, node.version) {
                continue;
            }

            let base_key = key_format.secret_key(&self.options.base_path, &node.path);
            builder.merge(key_format.flatten(&base_key, &node.value));
            staged.record(&node.path, node.version);
        }

        if cancel.is_some_and(|rx| *rx.borrow()) {
            return Err(VaultConfigError::Cancelled);
        }

        self.loaded.store(true, Ordering::Release);
        let applied = builder.applied();
        if applied == 0 {
            debug!("加载完成，{} 个密钥均无变化", seen);
            return Ok(CycleReport {
                seen,
                applied,
                skipped,
                generation: previous.snapshot.generation(),
            });
        }

        let snapshot = Arc::new(builder.build());
        let generation = snapshot.generation();
        state.tracker = staged;

        let retired = self.published.swap(Arc::new(Published {
            snapshot,
            signal: ChangeSignal::new(),
        }));
        retired.signal.fire();

        info!(
            "已发布新配置快照，代数: {}，更新密钥: {}/{}",
            generation, applied, seen
        );
        Ok(CycleReport {
            seen,
            applied,
            skipped,
            generation,
        })
    }
}

/// Vault 配置源，负责创建提供者
pub struct VaultConfigSource {
    options: SourceOptions,
    store: Arc<dyn SecretStore>,
}

impl VaultConfigSource {
    /// 使用任意存储创建配置源
    pub fn new(options: SourceOptions, store: Arc<dyn SecretStore>) -> Self {
        Self { options, store }
    }

    /// 由配置文件创建连接 Vault 的配置源
    ///
    /// # 参数
    /// * `global` - 全局配置
    /// * `source` - 配置源配置
    ///
    /// # 返回
    /// * `Result<Self>` - 配置源
    pub fn from_config(global: &GlobalConfig, source: &SourceConfig) -> Result<Self> {
        let settings = VaultStoreSettings::from_config(global, &source.mount_point);
        let store = VaultStore::new(settings)?;
        Ok(Self::new(SourceOptions::from_config(source), Arc::new(store)))
    }

    /// 配置源选项
    pub fn options(&self) -> &SourceOptions {
        &self.options
    }

    /// 覆盖轮询间隔，0 表示只加载一次
    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.options = self.options.with_reload_interval(interval);
        self
    }

    /// 执行首次加载并在需要时启动后台轮询
    ///
    /// # 返回
    /// * `Result<VaultConfigProvider>` - 首次加载失败时返回 `FatalStartup`
    pub async fn build(self) -> Result<VaultConfigProvider> {
        let interval = self.options.reload_interval;
        let provider = VaultConfigProvider::new(self.options, self.store);

        provider.trigger_reload().await?;

        if let Some(interval) = interval {
            provider.start_polling(interval).await;
        }
        Ok(provider)
    }
}

/// Vault 配置提供者
pub struct VaultConfigProvider {
    core: Arc<SourceCore>,
    scheduler: Mutex<Option<ReloadScheduler>>,
}

impl VaultConfigProvider {
    /// 创建尚未加载的提供者
    pub fn new(options: SourceOptions, store: Arc<dyn SecretStore>) -> Self {
        Self {
            core: Arc::new(SourceCore::new(options, store)),
            scheduler: Mutex::new(None),
        }
    }

    /// 配置源名称
    pub fn name(&self) -> &str {
        &self.core.options.name
    }

    /// 配置源选项
    pub fn options(&self) -> &SourceOptions {
        &self.core.options
    }

    /// 读取当前快照中的配置值
    pub fn get(&self, key: &str) -> Option<String> {
        self.core.snapshot().get(key).map(str::to_string)
    }

    /// 是否至少完成过一次成功的加载
    pub fn is_loaded(&self) -> bool {
        self.core.loaded.load(Ordering::Acquire)
    }

    /// 启动后台轮询，已在运行时忽略
    pub async fn start_polling(&self, interval: Duration) {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.as_ref().is_some_and(ReloadScheduler::is_running) {
            debug!("调度器已在运行: {}", self.name());
            return;
        }
        *scheduler = Some(ReloadScheduler::start(Arc::clone(&self.core), interval));
    }

    /// 调度器状态，未启动轮询时为 `None`
    pub async fn scheduler_status(&self) -> Option<SchedulerStatus> {
        match self.scheduler.lock().await.as_ref() {
            Some(scheduler) => Some(scheduler.status().await),
            None => None,
        }
    }

    /// 停止后台轮询
    pub async fn shutdown(&self) {
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await;
        }
    }
}

#[async_trait]
impl ConfigProvider for VaultConfigProvider {
    fn current_snapshot(&self) -> Arc<Snapshot> {
        self.core.snapshot()
    }

    fn watch_for_change(&self) -> ChangeSignal {
        self.core.signal()
    }

    async fn trigger_reload(&self) -> Result<ReloadOutcome> {
        let first_load = !self.is_loaded();

        match self.core.run_cycle(None).await {
            Ok(report) if report.applied > 0 => Ok(ReloadOutcome::Changed {
                applied: report.applied,
                generation: report.generation,
            }),
            Ok(_) => Ok(ReloadOutcome::Unchanged),
            Err(e) if first_load => {
                error!(parent: &self.core.span, "无法从 Vault 加载配置: {}", e);
                Err(VaultConfigError::FatalStartup {
                    source_name: self.name().to_string(),
                    cause: Box::new(e),
                })
            }
            Err(e) => {
                error!(parent: &self.core.span, "重新加载失败，继续使用上一次的配置: {}", e);
                Ok(ReloadOutcome::Failed)
            }
        }
    }
}
