//! Vault Config - HashiCorp Vault KV v2 配置源
//!
//! 把 Vault 中的密钥树展开为扁平的键值配置，支持：
//! - 深度优先枚举任意嵌套的密钥目录
//! - 嵌套对象与数组展开为 `a:b:0` 形式的配置键
//! - 基于版本号的增量加载与原子快照发布
//! - 后台定时轮询与一次性变更通知
//! - Token 与 AppRole 认证

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod source;
pub mod store;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, SourceConfig};
pub use error::{Result, StoreError, VaultConfigError};
pub use source::{
    ChangeSignal, ConfigProvider, ReloadOutcome, Snapshot, SourceOptions, VaultConfigProvider,
    VaultConfigSource,
};
pub use store::{MemoryStore, SecretStore, VaultStore, VaultStoreSettings};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
