//! 连接管理 - Disconnected → Connecting → Connected 状态机
//!
//! 每次连接尝试都会 spawn 一个链路任务，它独占 socket：
//! 先打开传输，成功后把发送端交回引擎，然后在发送帧和读取入站帧之间循环，
//! 连接结束时通过事件通道报告。每次尝试带一个递增的 generation，
//! 已经被拆除的链路发来的事件会被忽略。

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use crate::config::EngineConfig;
use crate::error::DeliveryError;
use crate::notification::Envelope;
use crate::transport::Transport;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// 链路任务发给引擎的事件
#[derive(Debug)]
pub enum LinkEvent {
    /// 连接已打开，附带发送端
    Opened {
        generation: u64,
        outbound: mpsc::UnboundedSender<String>,
    },
    /// 连接打开失败
    OpenFailed {
        generation: u64,
        error: DeliveryError,
    },
    /// 已打开的连接关闭或出错
    Closed {
        generation: u64,
        error: Option<DeliveryError>,
    },
}

/// 连接管理器（只由引擎任务持有和修改）
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<LinkEvent>,
    state: ConnectionState,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    link_task: Option<JoinHandle<()>>,
    backoff: Backoff,
    reconnect_at: Option<Instant>,
    auto_connect: bool,
    connect_timeout: Duration,
    log_inbound: bool,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<LinkEvent>,
        config: &EngineConfig,
    ) -> Self {
        let d = &config.delivery;
        Self {
            transport,
            events,
            state: ConnectionState::Disconnected,
            generation: 0,
            outbound: None,
            link_task: None,
            backoff: Backoff::new(
                Duration::from_millis(d.backoff_floor_ms),
                Duration::from_millis(d.backoff_ceiling_ms),
                Duration::from_millis(d.jitter_ms),
            ),
            reconnect_at: None,
            auto_connect: config.auto_connect,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            log_inbound: config.debug_logging,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// 当前退避值（毫秒）
    pub fn backoff_ms(&self) -> u64 {
        self.backoff.current().as_millis() as u64
    }

    /// 下一次重连的时间
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// 发起连接
    ///
    /// 已在连接中或已连接时不做任何事，除非 `force`：强制重连会先拆除现有连接。
    /// 返回是否发起了新的连接尝试。
    pub fn connect(&mut self, url: Result<String, DeliveryError>, force: bool) -> bool {
        if !force && self.state != ConnectionState::Disconnected {
            debug!(state = self.state.as_str(), "Connect ignored, already active");
            return false;
        }

        if force {
            self.teardown();
        }
        self.reconnect_at = None;
        self.generation += 1;
        self.state = ConnectionState::Connecting;

        let url = match url {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot open transport");
                self.state = ConnectionState::Disconnected;
                self.schedule_reconnect();
                return true;
            }
        };

        info!(url = %url, transport = self.transport.name(), generation = self.generation, "Connecting");
        let task = tokio::spawn(run_link(
            Arc::clone(&self.transport),
            url,
            self.generation,
            self.connect_timeout,
            self.events.clone(),
            self.log_inbound,
        ));
        self.link_task = Some(task);
        true
    }

    /// 处理连接成功，返回 false 表示事件已过期
    pub fn on_opened(&mut self, generation: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            debug!(generation, current = self.generation, "Dropping stale link");
            // 丢弃发送端，过期的链路任务随之关闭
            drop(outbound);
            return false;
        }

        self.state = ConnectionState::Connected;
        self.outbound = Some(outbound);
        self.reconnect_at = None;
        self.backoff.reset();
        info!(generation, "Connected");
        true
    }

    /// 处理连接打开失败
    pub fn on_open_failed(&mut self, generation: u64, error: DeliveryError) {
        if generation != self.generation {
            return;
        }
        warn!(error = %error, "Connection attempt failed");
        self.mark_disconnected();
    }

    /// 处理连接关闭或出错
    pub fn on_closed(&mut self, generation: u64, error: Option<DeliveryError>) {
        if generation != self.generation {
            return;
        }
        match error {
            Some(e) => warn!(error = %e, "Connection lost"),
            None => info!(error = %DeliveryError::TransportClosed, "Connection lost"),
        }
        self.mark_disconnected();
    }

    fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.outbound = None;
        self.link_task = None;
        if self.auto_connect {
            self.schedule_reconnect();
        } else {
            debug!("Auto-connect disabled, not reconnecting");
        }
    }

    /// 安排一次重连：当前退避 + 随机抖动
    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.delay();
        info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        self.reconnect_at = Some(Instant::now() + delay);
    }

    /// 重连计时器触发：退避翻倍后重新连接
    pub fn on_reconnect_timer(&mut self, url: Result<String, DeliveryError>) {
        self.reconnect_at = None;
        self.backoff.advance();
        self.connect(url, false);
    }

    /// 主动断开，不安排重连；返回仍在关闭中的链路任务
    pub fn disconnect(&mut self) -> Option<JoinHandle<()>> {
        let task = self.teardown();
        self.reconnect_at = None;
        // 之后到达的旧链路事件都视为过期
        self.generation += 1;
        if self.state != ConnectionState::Disconnected {
            info!("Disconnected");
        }
        self.state = ConnectionState::Disconnected;
        task
    }

    /// 拆除现有链路：连接中直接中止，已连接则关闭发送端让链路任务优雅关闭
    fn teardown(&mut self) -> Option<JoinHandle<()>> {
        self.outbound = None;
        let task = self.link_task.take()?;
        if self.state == ConnectionState::Connecting {
            task.abort();
            None
        } else {
            Some(task)
        }
    }

    /// 通过当前连接发送 envelope；连接不可用时返回 false
    pub fn send(&mut self, envelope: &Envelope) -> bool {
        if self.state != ConnectionState::Connected {
            return false;
        }
        match &self.outbound {
            Some(tx) => tx.send(envelope.to_frame()).is_ok(),
            None => false,
        }
    }

    /// 应用新的配置快照（不影响当前连接）
    pub fn reconfigure(&mut self, config: &EngineConfig) {
        let d = &config.delivery;
        self.backoff.reconfigure(
            Duration::from_millis(d.backoff_floor_ms),
            Duration::from_millis(d.backoff_ceiling_ms),
            Duration::from_millis(d.jitter_ms),
        );
        self.auto_connect = config.auto_connect;
        self.connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        self.log_inbound = config.debug_logging;
        if !self.auto_connect {
            self.reconnect_at = None;
        }
    }
}

/// 链路任务：打开传输，然后在出站帧和入站帧之间循环
async fn run_link(
    transport: Arc<dyn Transport>,
    url: String,
    generation: u64,
    connect_timeout: Duration,
    events: mpsc::UnboundedSender<LinkEvent>,
    log_inbound: bool,
) {
    let mut link = match tokio::time::timeout(connect_timeout, transport.open(&url)).await {
        Ok(Ok(link)) => link,
        Ok(Err(error)) => {
            let _ = events.send(LinkEvent::OpenFailed { generation, error });
            return;
        }
        Err(_) => {
            let error = DeliveryError::TransportOpenFailed {
                url,
                reason: format!("timed out after {:?}", connect_timeout),
            };
            let _ = events.send(LinkEvent::OpenFailed { generation, error });
            return;
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    if events
        .send(LinkEvent::Opened {
            generation,
            outbound: outbound_tx,
        })
        .is_err()
    {
        link.close().await;
        return;
    }

    let error = loop {
        tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = link.send(frame).await {
                        warn!(error = %e, "Frame lost");
                    }
                }
                None => {
                    // 引擎已放弃这条链路
                    link.close().await;
                    return;
                }
            },
            inbound = link.recv() => match inbound {
                Some(Ok(text)) => {
                    if log_inbound {
                        debug!(frame = %text, "Inbound frame");
                    }
                }
                Some(Err(e)) => break Some(e),
                None => break None,
            },
        }
    };

    let _ = events.send(LinkEvent::Closed { generation, error });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn manager(transport: &MemoryTransport) -> (ConnectionManager, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut config = EngineConfig::default();
        config.delivery.jitter_ms = 0;
        (ConnectionManager::new(Arc::new(transport.clone()), tx, &config), rx)
    }

    fn url() -> Result<String, DeliveryError> {
        Ok("ws://127.0.0.1:42070/?client=test".to_string())
    }

    #[tokio::test]
    async fn test_connect_then_opened() {
        let transport = MemoryTransport::new();
        let (mut conn, mut events) = manager(&transport);

        assert!(conn.connect(url(), false));
        assert_eq!(conn.state(), ConnectionState::Connecting);

        // 连接中再次 connect 是 no-op
        assert!(!conn.connect(url(), false));

        match events.recv().await.unwrap() {
            LinkEvent::Opened { generation, outbound } => assert!(conn.on_opened(generation, outbound)),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(conn.is_connected());
        assert_eq!(transport.open_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_schedules_reconnect() {
        let transport = MemoryTransport::new();
        transport.set_refuse(true);
        let (mut conn, mut events) = manager(&transport);

        conn.connect(url(), false);
        match events.recv().await.unwrap() {
            LinkEvent::OpenFailed { generation, error } => conn.on_open_failed(generation, error),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        let at = conn.reconnect_at().unwrap();
        assert_eq!(at - Instant::now(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_url_fails_synchronously() {
        let transport = MemoryTransport::new();
        let (mut conn, _events) = manager(&transport);

        let bad = Err(DeliveryError::TransportOpenFailed {
            url: "ws://bad host/".to_string(),
            reason: "invalid domain character".to_string(),
        });
        conn.connect(bad, false);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.reconnect_at().is_some());
        assert_eq!(transport.open_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_then_resets() {
        let transport = MemoryTransport::new();
        transport.set_refuse(true);
        let (mut conn, mut events) = manager(&transport);

        conn.connect(url(), false);
        let mut seen = Vec::new();
        for _ in 0..6 {
            if let Some(LinkEvent::OpenFailed { generation, error }) = events.recv().await {
                conn.on_open_failed(generation, error);
            }
            seen.push(conn.backoff_ms());
            conn.on_reconnect_timer(url());
        }
        assert_eq!(seen, vec![1000, 2000, 4000, 8000, 15000, 15000]);

        transport.set_refuse(false);
        if let Some(LinkEvent::Opened { generation, outbound }) = events.recv().await {
            assert!(conn.on_opened(generation, outbound));
        }
        assert_eq!(conn.backoff_ms(), 1000);
    }

    #[tokio::test]
    async fn test_stale_events_ignored_after_disconnect() {
        let transport = MemoryTransport::new();
        let (mut conn, mut events) = manager(&transport);

        conn.connect(url(), false);
        let event = events.recv().await.unwrap();
        conn.disconnect();

        if let LinkEvent::Opened { generation, outbound } = event {
            assert!(!conn.on_opened(generation, outbound));
        }
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.reconnect_at().is_none());
    }

    #[tokio::test]
    async fn test_closed_without_auto_connect_stays_down() {
        let transport = MemoryTransport::new();
        let (tx, mut events) = mpsc::unbounded_channel();
        let config = EngineConfig {
            auto_connect: false,
            ..Default::default()
        };
        let mut conn = ConnectionManager::new(Arc::new(transport.clone()), tx, &config);

        conn.connect(url(), false);
        if let Some(LinkEvent::Opened { generation, outbound }) = events.recv().await {
            conn.on_opened(generation, outbound);
        }
        transport.drop_connection();
        if let Some(LinkEvent::Closed { generation, error }) = events.recv().await {
            conn.on_closed(generation, error);
        }
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.reconnect_at().is_none());
    }
}
