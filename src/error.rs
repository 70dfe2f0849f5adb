//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Vault Config 的主要错误类型
#[derive(Error, Debug)]
pub enum VaultConfigError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 后端存储相关错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// 首次加载失败，没有可回退的快照
    #[error("配置源 {source_name} 首次加载失败: {cause}")]
    FatalStartup {
        source_name: String,
        #[source]
        cause: Box<VaultConfigError>,
    },

    /// 加载周期被取消
    #[error("加载已取消")]
    Cancelled,

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl VaultConfigError {
    /// 是否为单条密钥文档格式错误（可跳过，不影响本轮加载）
    pub fn is_malformed(&self) -> bool {
        matches!(self, VaultConfigError::Store(StoreError::Malformed { .. }))
    }
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 后端存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 路径不存在（用于区分目录与叶子，不作为错误上报）
    #[error("路径不存在: {path}")]
    NotFound { path: String },

    /// 后端返回非预期状态
    #[error("后端请求失败: {path} (状态码 {status}): {message}")]
    Backend {
        path: String,
        status: u16,
        message: String,
    },

    /// HTTP请求错误
    #[error("HTTP请求失败: {0}")]
    Http(#[from] reqwest::Error),

    /// 认证失败
    #[error("认证失败: {0}")]
    Auth(String),

    /// 密钥文档无法解析
    #[error("密钥文档格式错误: {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// 后端不可用
    #[error("后端不可用: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// 是否为路径不存在
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, VaultConfigError>;
