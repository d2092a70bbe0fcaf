//! 内存传输 - 进程内的假渲染端，用于测试和 dry-run
//!
//! 可以拒绝连接、让发送失败、从"服务端"断开连接或推送入站帧，
//! 并按顺序记录每一个发出的帧及其发送时间。

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use super::{FrameLink, Transport};
use crate::error::DeliveryError;

/// 已发送的帧
#[derive(Debug, Clone)]
pub struct SentFrame {
    /// 发送时间
    pub at: Instant,
    /// 所属连接编号（从 1 开始）
    pub link: u64,
    pub frame: String,
}

enum ServerEvent {
    Frame(String),
    Close,
}

#[derive(Default)]
struct MemoryState {
    refuse: bool,
    fail_sends: bool,
    open_attempts: usize,
    links_opened: u64,
    active: Option<(u64, mpsc::UnboundedSender<ServerEvent>)>,
    sent: Vec<SentFrame>,
}

/// 内存传输（可克隆，克隆共享同一个假渲染端）
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    sent_changed: Arc<Notify>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 之后的连接尝试都失败
    pub fn set_refuse(&self, refuse: bool) {
        self.state().refuse = refuse;
    }

    /// 之后的发送都失败
    pub fn set_fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    /// 连接尝试次数（含失败）
    pub fn open_attempts(&self) -> usize {
        self.state().open_attempts
    }

    /// 成功打开的连接数
    pub fn links_opened(&self) -> u64 {
        self.state().links_opened
    }

    /// 当前是否有打开的连接
    pub fn is_connected(&self) -> bool {
        self.state().active.is_some()
    }

    /// 从服务端断开当前连接，没有连接时返回 false
    pub fn drop_connection(&self) -> bool {
        match self.state().active.take() {
            Some((_, tx)) => tx.send(ServerEvent::Close).is_ok(),
            None => false,
        }
    }

    /// 向当前连接推送一个入站帧
    pub fn push_inbound(&self, frame: impl Into<String>) -> bool {
        match &self.state().active {
            Some((_, tx)) => tx.send(ServerEvent::Frame(frame.into())).is_ok(),
            None => false,
        }
    }

    /// 已发送的帧（按发送顺序）
    pub fn sent(&self) -> Vec<SentFrame> {
        self.state().sent.clone()
    }

    /// 已发送帧的文本
    pub fn frames(&self) -> Vec<String> {
        self.state().sent.iter().map(|s| s.frame.clone()).collect()
    }

    /// 等待至少 `count` 个帧被发送
    pub async fn wait_for_sent(&self, count: usize) {
        loop {
            let notified = self.sent_changed.notified();
            if self.state().sent.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, url: &str) -> Result<Box<dyn FrameLink>, DeliveryError> {
        let mut state = self.state();
        state.open_attempts += 1;
        if state.refuse {
            return Err(DeliveryError::TransportOpenFailed {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        state.links_opened += 1;
        let id = state.links_opened;
        let (tx, rx) = mpsc::unbounded_channel();
        state.active = Some((id, tx));

        Ok(Box::new(MemoryLink {
            id,
            transport: self.clone(),
            events: rx,
        }))
    }
}

struct MemoryLink {
    id: u64,
    transport: MemoryTransport,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

#[async_trait]
impl FrameLink for MemoryLink {
    async fn send(&mut self, frame: String) -> Result<(), DeliveryError> {
        {
            let mut state = self.transport.state();
            if state.fail_sends {
                return Err(DeliveryError::TransportSendFailed(
                    "simulated write failure".to_string(),
                ));
            }
            state.sent.push(SentFrame {
                at: Instant::now(),
                link: self.id,
                frame,
            });
        }
        self.transport.sent_changed.notify_waiters();
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, DeliveryError>> {
        match self.events.recv().await {
            Some(ServerEvent::Frame(text)) => Some(Ok(text)),
            Some(ServerEvent::Close) | None => None,
        }
    }

    async fn close(&mut self) {
        self.events.close();
        let mut state = self.transport.state();
        if matches!(&state.active, Some((id, _)) if *id == self.id) {
            state.active = None;
        }
    }
}
