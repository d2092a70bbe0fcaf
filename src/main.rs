//! Overlay Notifier CLI
//!
//! 把通知投递到本机的游戏内覆盖层渲染端

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use overlay_notifier::cli::{handle_config, handle_pipe, handle_send, ConfigCommand, PipeArgs, SendArgs};
use overlay_notifier::EngineConfig;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "ovn")]
#[command(about = "Overlay Notifier - 把通知投递到游戏内覆盖层")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/overlay-notifier/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 输出 debug 日志
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 发送一条通知
    Send(SendArgs),
    /// 从标准输入读取 JSON 行并逐条发送
    Pipe(PipeArgs),
    /// 配置文件管理
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

fn init_logging(debug_logging: bool) {
    let default = if debug_logging {
        "overlay_notifier=debug,ovn=debug"
    } else {
        "overlay_notifier=info,ovn=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => EngineConfig::default_path()?,
    };
    let mut config = EngineConfig::load_from(&path)?;
    config.apply_env_overrides();

    init_logging(cli.verbose || config.debug_logging);
    debug!(path = %path.display(), host = %config.host, port = config.port, "Config loaded");

    match cli.command {
        Commands::Send(args) => handle_send(args, config).await?,
        Commands::Pipe(args) => handle_pipe(args, config).await?,
        Commands::Config { command } => handle_config(command, &path, &config)?,
    }

    Ok(())
}
