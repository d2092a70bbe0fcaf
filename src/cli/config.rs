//! Config 命令 - 查看和初始化配置文件

use std::path::Path;

use anyhow::{bail, Result};
use clap::Subcommand;

use crate::config::EngineConfig;

use super::output::format_output;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// 显示生效的配置（含环境变量覆盖）
    Show {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 写入默认配置文件
    Init {
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },
    /// 显示配置文件路径
    Path,
}

/// 处理 config 命令
pub fn handle_config(command: ConfigCommand, path: &Path, config: &EngineConfig) -> Result<()> {
    match command {
        ConfigCommand::Show { json } => {
            println!("{}", format_output(config, json));
            if let Ok(url) = config.endpoint_url() {
                if !json {
                    println!("endpoint: {}", url);
                }
            }
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
            }
            EngineConfig::default().save_to(path)?;
            println!("✅ 已写入 {}", path.display());
        }
        ConfigCommand::Path => println!("{}", path.display()),
    }
    Ok(())
}
