//! Vault Config 主程序入口
//!
//! 把 Vault KV 密钥树展开为扁平配置的命令行工具

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};
use vault_config::cli::args::{Args, Commands};
use vault_config::cli::commands::{
    Command, DumpCommand, ValidateCommand, VersionCommand, WatchCommand,
};
use vault_config::logging::{LogConfig, LoggingSystem};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig {
        level: args.log_level.clone().into(),
        console: true,
        json_format: false,
        ..Default::default()
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    debug!("Vault Config v{} 启动", vault_config::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Dump { .. } => Box::new(DumpCommand),
        Commands::Watch { .. } => Box::new(WatchCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await?;
    Ok(())
}
