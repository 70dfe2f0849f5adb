//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::config::GlobalConfig;
use crate::store::vault::{
    DEFAULT_MOUNT_POINT, ENV_VAULT_ADDR, ENV_VAULT_NAMESPACE, ENV_VAULT_ROLE_ID,
    ENV_VAULT_SECRET_ID, ENV_VAULT_TOKEN,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Vault Config - 把 Vault KV 密钥树展开为扁平配置
#[derive(Parser, Debug, Clone)]
#[command(
    name = "vault-config",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "VAULT_CONFIG_FILE",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        help = "日志级别",
        env = "VAULT_CONFIG_LOG_LEVEL",
        global = true
    )]
    pub log_level: LogLevel,

    /// Vault 地址
    #[arg(long, value_name = "URL", help = "Vault 地址", env = ENV_VAULT_ADDR, global = true)]
    pub address: Option<String>,

    /// 访问令牌
    #[arg(
        long,
        value_name = "TOKEN",
        help = "访问令牌",
        env = ENV_VAULT_TOKEN,
        hide_env_values = true,
        global = true
    )]
    pub token: Option<String>,

    /// AppRole 角色 ID
    #[arg(long, value_name = "ID", help = "AppRole 角色 ID", env = ENV_VAULT_ROLE_ID, global = true)]
    pub role_id: Option<String>,

    /// AppRole 密钥 ID
    #[arg(
        long,
        value_name = "ID",
        help = "AppRole 密钥 ID",
        env = ENV_VAULT_SECRET_ID,
        hide_env_values = true,
        global = true
    )]
    pub secret_id: Option<String>,

    /// Vault 命名空间
    #[arg(long, value_name = "NS", help = "Vault 命名空间", env = ENV_VAULT_NAMESPACE, global = true)]
    pub namespace: Option<String>,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 加载一次并输出展开后的配置
    Dump {
        /// 只输出指定的配置源
        #[arg(short, long, value_name = "NAME", help = "配置源名称")]
        source: Option<String>,

        /// 临时指定根路径，不读取配置文件中的配置源
        #[arg(long, value_name = "PATH", help = "密钥树根路径")]
        base_path: Option<String>,

        /// 临时配置源的挂载点
        #[arg(
            long,
            value_name = "MOUNT",
            default_value = DEFAULT_MOUNT_POINT,
            requires = "base_path",
            help = "KV 引擎挂载点"
        )]
        mount: String,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 持续轮询并记录每次配置变更
    Watch {
        /// 覆盖所有配置源的轮询间隔（秒）
        #[arg(short, long, value_name = "SECONDS", help = "轮询间隔（秒）")]
        interval: Option<u64>,
    },

    /// 验证配置文件
    Validate {
        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }

    /// 用命令行参数覆盖全局配置
    pub fn apply_overrides(&self, global: &mut GlobalConfig) {
        if let Some(address) = &self.address {
            global.address = address.clone();
        }
        if let Some(token) = &self.token {
            global.token = Some(token.clone());
        }
        if let Some(role_id) = &self.role_id {
            global.role_id = Some(role_id.clone());
        }
        if let Some(secret_id) = &self.secret_id {
            global.secret_id = Some(secret_id.clone());
        }
        if let Some(namespace) = &self.namespace {
            global.namespace = Some(namespace.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dump_with_base_path() {
        let args = Args::try_parse_from([
            "vault-config",
            "dump",
            "--base-path",
            "app",
            "--mount",
            "kv",
            "--format",
            "json",
        ])
        .unwrap();

        match args.command {
            Commands::Dump {
                base_path,
                mount,
                format,
                source,
            } => {
                assert_eq!(base_path.as_deref(), Some("app"));
                assert_eq!(mount, "kv");
                assert_eq!(format, OutputFormat::Json);
                assert!(source.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_mount_requires_base_path() {
        let result = Args::try_parse_from(["vault-config", "dump", "--mount", "kv"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "vault-config",
            "watch",
            "--interval",
            "5",
            "--address",
            "http://vault:8200",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.address.as_deref(), Some("http://vault:8200"));
        assert_eq!(args.log_level, LogLevel::Debug);
        assert!(matches!(args.command, Commands::Watch { interval: Some(5) }));
    }

    #[test]
    fn test_apply_overrides() {
        let args = Args::try_parse_from([
            "vault-config",
            "--token",
            "cli-token",
            "--namespace",
            "team-b",
            "validate",
        ])
        .unwrap();

        let mut global = GlobalConfig {
            token: Some("file-token".to_string()),
            ..GlobalConfig::default()
        };
        args.apply_overrides(&mut global);

        assert_eq!(global.token.as_deref(), Some("cli-token"));
        assert_eq!(global.namespace.as_deref(), Some("team-b"));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(LogLevel::Trace.to_string(), "trace");
    }
}
