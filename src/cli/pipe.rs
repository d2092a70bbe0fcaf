//! Pipe 命令 - 从标准输入逐行读取 JSON 通知请求
//!
//! 每行一个请求：`{"title": "...", "body": "...", "timeout_ms": 4000}`。
//! 读到 EOF 后等待已提交的通知发完（或超时），然后关闭引擎。

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::delivery::NotificationEngine;
use crate::notification::NotificationRequest;

use super::output::{format_output, format_status};

/// Pipe 命令参数
#[derive(Args)]
pub struct PipeArgs {
    /// EOF 后最长等待时间（毫秒）
    #[arg(long, default_value = "30000")]
    pub settle_ms: u64,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 解析一行输入，空行返回 None
pub fn parse_request_line(line: &str) -> Option<Result<NotificationRequest, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// 处理 pipe 命令
pub async fn handle_pipe(args: PipeArgs, config: EngineConfig) -> Result<()> {
    let engine = NotificationEngine::start(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut submitted: u64 = 0;
    let mut rejected: u64 = 0;
    while let Some(line) = lines.next_line().await? {
        match parse_request_line(&line) {
            Some(Ok(request)) => {
                debug!(title = %request.title, "Request received");
                engine.notify(request);
                submitted += 1;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Skipping malformed line");
                rejected += 1;
            }
            None => {}
        }
    }
    info!(submitted, rejected, "Input closed");

    let mut rx = engine.subscribe();
    let settle = Duration::from_millis(args.settle_ms);
    let settled = tokio::time::timeout(settle, rx.wait_for(|s| s.settled() >= submitted))
        .await
        .is_ok();
    if !settled {
        warn!(status = %format_status(&engine.status()), "Not all notifications were delivered");
    }

    engine.shutdown().await;
    println!("{}", format_output(&engine.status(), args.json));
    Ok(())
}
