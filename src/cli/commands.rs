//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{
    validate_config, Config, ConfigLoader, GlobalConfig, SourceConfig, TomlConfigLoader,
};
use crate::error::{ConfigError, Result};
use crate::source::{ConfigProvider, Snapshot, VaultConfigProvider, VaultConfigSource};
use crate::store::vault::DEFAULT_VAULT_TOKEN;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载配置文件并应用命令行覆盖
///
/// # 参数
/// * `args` - 命令行参数
///
/// # 返回
/// * `Result<Config>` - 覆盖并重新验证后的配置
pub async fn load_config(args: &Args) -> Result<Config> {
    let loader = TomlConfigLoader::new(true);
    let config_path = args.get_config_path();

    // 文件中的凭据可以由命令行补全，因此先覆盖再验证
    let mut config = loader.load_unvalidated(&config_path).await?;
    args.apply_overrides(&mut config.global);
    loader.validate(&config)?;

    info!("已加载配置文件: {}", config_path.display());
    Ok(config)
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { verbose } = &args.command {
            let config_path = args.get_config_path();
            println!("验证配置文件: {}", config_path.display());

            let config = load_config(args).await?;
            if *verbose {
                print_config_summary(&config);
            } else {
                println!("✓ 配置文件验证通过");
                println!("✓ 找到 {} 个配置源", config.sources.len());
            }
        }
        Ok(())
    }
}

fn print_config_summary(config: &Config) {
    println!("配置验证通过！");
    println!("全局配置:");
    println!("  Vault 地址: {}", config.global.address);
    println!(
        "  认证方式: {}",
        if config.global.uses_app_role() {
            "AppRole"
        } else {
            "Token"
        }
    );
    if let Some(namespace) = &config.global.namespace {
        println!("  命名空间: {}", namespace);
    }
    println!("  请求超时: {}秒", config.global.request_timeout_seconds);
    println!("  日志级别: {}", config.global.log_level);

    println!("配置源:");
    for (i, source) in config.sources.iter().enumerate() {
        println!(
            "  {}. {} ({}/{})",
            i + 1,
            source.name,
            source.mount_point,
            source.base_path
        );
        if source.reload_on_change {
            println!("     轮询间隔: {}秒", source.reload_interval_seconds);
        } else {
            println!("     轮询: 关闭");
        }
        if let Some(prefix) = &source.key_prefix {
            println!("     键前缀: {}", prefix);
        }
    }
}

/// 导出命令
pub struct DumpCommand;

#[async_trait]
impl Command for DumpCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Dump {
            source,
            base_path,
            mount,
            format,
        } = &args.command
        {
            let (global, sources) = match base_path {
                Some(base_path) => {
                    let mut adhoc = SourceConfig::new("adhoc", base_path);
                    adhoc.mount_point = mount.clone();
                    (adhoc_global(args), vec![adhoc])
                }
                None => {
                    let config = load_config(args).await?;
                    let sources = select_sources(config.sources, source.as_deref())?;
                    (config.global, sources)
                }
            };

            let mut snapshots = BTreeMap::new();
            for source in &sources {
                let provider = VaultConfigSource::from_config(&global, source)?
                    .with_reload_interval(Duration::ZERO)
                    .build()
                    .await?;
                snapshots.insert(source.name.clone(), provider.current_snapshot());
            }

            print_snapshots(&snapshots, format)?;
        }
        Ok(())
    }
}

/// 没有配置文件时由命令行与环境变量组装全局配置
fn adhoc_global(args: &Args) -> GlobalConfig {
    let mut global = GlobalConfig::default();
    args.apply_overrides(&mut global);
    if global.token.is_none() && !global.uses_app_role() {
        global.token = Some(DEFAULT_VAULT_TOKEN.to_string());
    }
    global
}

fn select_sources(sources: Vec<SourceConfig>, name: Option<&str>) -> Result<Vec<SourceConfig>> {
    let Some(name) = name else {
        return Ok(sources);
    };

    let selected: Vec<_> = sources.into_iter().filter(|s| s.name == name).collect();
    if selected.is_empty() {
        return Err(ConfigError::ValidationError(format!("未找到名为 '{}' 的配置源", name)).into());
    }
    Ok(selected)
}

fn print_snapshots(snapshots: &BTreeMap<String, Arc<Snapshot>>, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output: BTreeMap<&str, serde_json::Value> = snapshots
                .iter()
                .map(|(name, snapshot)| {
                    let entries: serde_json::Map<String, serde_json::Value> = snapshot
                        .iter()
                        .map(|(key, value)| {
                            let value = value
                                .map(|v| serde_json::Value::String(v.to_string()))
                                .unwrap_or(serde_json::Value::Null);
                            (key.to_string(), value)
                        })
                        .collect();
                    (name.as_str(), serde_json::Value::Object(entries))
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for (name, snapshot) in snapshots {
                println!("# {} ({} 个配置项)", name, snapshot.len());
                print!("{}", render_text(snapshot));
            }
        }
    }
    Ok(())
}

/// 以 `key = value` 的形式渲染快照，空值显示为 `<null>`
pub fn render_text(snapshot: &Snapshot) -> String {
    snapshot
        .iter()
        .map(|(key, value)| format!("{} = {}\n", key, value.unwrap_or("<null>")))
        .collect()
}

/// 监视命令
pub struct WatchCommand;

#[async_trait]
impl Command for WatchCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Watch { interval } = &args.command {
            let config = load_config(args).await?;

            let mut providers = Vec::with_capacity(config.sources.len());
            for source in &config.sources {
                let mut source = source.clone();
                if let Some(interval) = interval {
                    source.reload_on_change = true;
                    source.reload_interval_seconds = *interval;
                }
                if !source.reload_on_change {
                    warn!("配置源 {} 未启用轮询，只加载一次", source.name);
                }
                validate_config(&Config {
                    global: config.global.clone(),
                    sources: vec![source.clone()],
                })
                .map_err(ConfigError::ValidationError)?;

                let provider = VaultConfigSource::from_config(&config.global, &source)?
                    .build()
                    .await?;
                let snapshot = provider.current_snapshot();
                info!(
                    "配置源 {} 已加载 {} 个配置项，代数: {}",
                    provider.name(),
                    snapshot.len(),
                    snapshot.generation()
                );
                providers.push(Arc::new(provider));
            }

            let watchers: Vec<_> = providers
                .iter()
                .map(|provider| tokio::spawn(log_changes(Arc::clone(provider))))
                .collect();

            tokio::signal::ctrl_c().await?;
            info!("收到中断信号，正在停止...");

            for watcher in &watchers {
                watcher.abort();
            }
            for provider in &providers {
                provider.shutdown().await;
            }
        }
        Ok(())
    }
}

/// 持续等待变更信号并记录新旧快照之间的差异
async fn log_changes(provider: Arc<VaultConfigProvider>) {
    loop {
        let (before, after) = next_change(&provider).await;

        for (key, value) in changed_entries(&before, &after) {
            info!("[{}] {} = {}", provider.name(), key, value.unwrap_or("<null>"));
        }
        info!(
            "[{}] 配置已更新，代数: {} -> {}",
            provider.name(),
            before.generation(),
            after.generation()
        );
    }
}

/// 等待下一次发布，返回发布前后的快照
async fn next_change(provider: &VaultConfigProvider) -> (Arc<Snapshot>, Arc<Snapshot>) {
    // 先取快照再取信号，两次读取之间的发布会并入下一次差异
    let before = provider.current_snapshot();
    let signal = provider.watch_for_change();
    signal.changed().await;
    (before, provider.current_snapshot())
}

/// 新增或取值变化的配置项
fn changed_entries<'a>(
    before: &Snapshot,
    after: &'a Snapshot,
) -> Vec<(&'a str, Option<&'a str>)> {
    after
        .iter()
        .filter(|(key, value)| before.entry(key) != Some(*value))
        .collect()
}
