//! Send 命令 - 投递一条通知并等待结果
//!
//! `--dry-run` 不连接渲染端，而是把将要发送的帧打印出来。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::delivery::{EngineStatus, NotificationEngine};
use crate::notification::NotificationRequest;
use crate::transport::MemoryTransport;

use super::output::{format_output, format_status};

/// Send 命令参数
#[derive(Args)]
pub struct SendArgs {
    /// 标题（通常是发送者名字）
    pub title: String,

    /// 正文，可以带聊天标记
    pub body: String,

    /// 显示时长（毫秒），默认使用配置值
    #[arg(long, short)]
    pub timeout_ms: Option<u64>,

    /// 本地图标文件
    #[arg(long, conflicts_with = "icon_url")]
    pub icon: Option<PathBuf>,

    /// 远程图标地址
    #[arg(long)]
    pub icon_url: Option<String>,

    /// 通知类别
    #[arg(long, short)]
    pub category: Option<String>,

    /// 不连接渲染端，只打印帧
    #[arg(long)]
    pub dry_run: bool,

    /// 最长等待时间（毫秒）
    #[arg(long, default_value = "10000")]
    pub wait_ms: u64,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// Send 命令输出
#[derive(Debug, Serialize)]
pub struct SendOutput {
    pub delivered: bool,
    pub status: EngineStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<String>,
}

impl SendArgs {
    async fn into_request(self) -> Result<NotificationRequest> {
        let mut request = NotificationRequest::new(self.title, self.body);
        if let Some(timeout_ms) = self.timeout_ms {
            request = request.with_timeout_ms(timeout_ms);
        }
        if let Some(path) = self.icon {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read icon {}", path.display()))?;
            request = request.with_icon_bytes(bytes);
        }
        if let Some(url) = self.icon_url {
            request = request.with_icon_url(url);
        }
        if let Some(category) = self.category {
            request = request.with_category(category);
        }
        Ok(request)
    }
}

/// 处理 send 命令
pub async fn handle_send(args: SendArgs, config: EngineConfig) -> Result<()> {
    let json = args.json;
    let dry_run = args.dry_run;
    let wait = Duration::from_millis(args.wait_ms);
    let request = args.into_request().await?;

    let memory = MemoryTransport::new();
    let mut builder = NotificationEngine::builder(config);
    if dry_run {
        builder = builder.transport(Arc::new(memory.clone()));
    }
    let engine = builder.start();
    engine.notify(request);

    let mut rx = engine.subscribe();
    let settled = tokio::time::timeout(wait, rx.wait_for(|s| s.settled() >= 1))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
    let status = engine.status();
    let delivered = status.delivered >= 1;
    if status.skipped >= 1 {
        info!("Category disabled, notification skipped");
    } else if !settled {
        warn!(wait_ms = wait.as_millis() as u64, status = %format_status(&status), "Notification not delivered in time");
    }

    // 关闭前让链路任务写完已交付的帧
    engine.shutdown().await;

    let frames = if dry_run { memory.frames() } else { Vec::new() };
    let output = SendOutput {
        delivered,
        status: engine.status(),
        frames,
    };

    if json {
        println!("{}", format_output(&output, true));
    } else if dry_run {
        for frame in &output.frames {
            println!("{}", frame);
        }
    } else {
        info!(delivered, "Send finished");
        println!("{}", format_status(&output.status));
    }
    Ok(())
}
