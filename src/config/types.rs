//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::store::vault::{DEFAULT_MOUNT_POINT, DEFAULT_VAULT_ADDR};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 主配置结构，包含全局配置和配置源列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    pub global: GlobalConfig,
    /// 配置源列表
    pub sources: Vec<SourceConfig>,
}

/// 全局配置结构，描述如何连接 Vault
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// Vault 服务地址
    #[serde(default = "default_address")]
    pub address: String,
    /// 访问令牌
    pub token: Option<String>,
    /// AppRole 角色 ID
    pub role_id: Option<String>,
    /// AppRole 密钥 ID
    pub secret_id: Option<String>,
    /// Vault 命名空间
    pub namespace: Option<String>,
    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// 是否跳过 TLS 证书校验
    #[serde(default)]
    pub accept_insecure_connection: bool,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            token: None,
            role_id: None,
            secret_id: None,
            namespace: None,
            request_timeout_seconds: default_timeout(),
            accept_insecure_connection: false,
            log_level: default_log_level(),
        }
    }
}

impl GlobalConfig {
    /// 是否配置了 AppRole 认证
    pub fn uses_app_role(&self) -> bool {
        self.role_id.as_deref().is_some_and(|id| !id.is_empty())
            && self.secret_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// 配置源结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// 配置源名称
    pub name: String,
    /// 密钥树根路径
    #[serde(default)]
    pub base_path: String,
    /// KV 引擎挂载点
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
    /// 是否在后台轮询变更
    #[serde(default)]
    pub reload_on_change: bool,
    /// 轮询间隔（秒）
    #[serde(default = "default_reload_interval")]
    pub reload_interval_seconds: u64,
    /// 配置键前缀
    pub key_prefix: Option<String>,
    /// 需要替换为分隔符的额外字符
    #[serde(default)]
    pub additional_path_characters: String,
    /// 不把密钥路径拼入配置键
    #[serde(default)]
    pub omit_secret_path: bool,
    /// 根路径只作为目录处理
    #[serde(default)]
    pub base_path_is_folder: bool,
}

impl SourceConfig {
    /// 以默认选项创建配置源
    pub fn new(name: &str, base_path: &str) -> Self {
        Self {
            name: name.to_string(),
            base_path: base_path.to_string(),
            mount_point: default_mount_point(),
            reload_on_change: false,
            reload_interval_seconds: default_reload_interval(),
            key_prefix: None,
            additional_path_characters: String::new(),
            omit_secret_path: false,
            base_path_is_folder: false,
        }
    }
}

// 默认值函数
fn default_address() -> String {
    DEFAULT_VAULT_ADDR.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_timeout() -> u64 {
    10
}
fn default_mount_point() -> String {
    DEFAULT_MOUNT_POINT.to_string()
}
fn default_reload_interval() -> u64 {
    300
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    let global = &config.global;

    if global.address.trim().is_empty() {
        return Err("Vault 地址不能为空".to_string());
    }

    if !global.address.starts_with("http://") && !global.address.starts_with("https://") {
        return Err(format!("Vault 地址格式无效: {}", global.address));
    }

    let has_token = global.token.as_deref().is_some_and(|t| !t.is_empty());
    if !has_token && !global.uses_app_role() {
        return Err("必须配置 token 或 role_id/secret_id".to_string());
    }

    if global.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            global.log_level, valid_log_levels
        ));
    }

    // 验证配置源
    if config.sources.is_empty() {
        return Err("至少需要配置一个配置源".to_string());
    }

    let mut names = HashSet::new();
    for source in &config.sources {
        if source.name.trim().is_empty() {
            return Err("配置源名称不能为空".to_string());
        }

        if !names.insert(source.name.as_str()) {
            return Err(format!("配置源名称重复: {}", source.name));
        }

        if source.mount_point.trim_matches('/').is_empty() {
            return Err(format!("配置源 {} 的挂载点不能为空", source.name));
        }

        if source.reload_on_change && source.reload_interval_seconds == 0 {
            return Err(format!("配置源 {} 的轮询间隔不能为0", source.name));
        }

        if source.additional_path_characters.contains('/') {
            return Err(format!(
                "配置源 {} 的额外路径字符不能包含 '/'",
                source.name
            ));
        }
    }

    Ok(())
}
