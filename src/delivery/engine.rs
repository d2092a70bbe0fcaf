//! 投递引擎 - 对外入口，串起构建、限流、队列和连接管理
//!
//! 两个任务：
//! - 准备任务：按提交顺序逐个处理请求（类别过滤 → 下载图标 → 清理 → 构建 → 编码），
//!   图标下载不会阻塞连接管理
//! - 引擎任务：唯一持有连接状态、发送队列和限流器，所有状态修改都在这里串行发生
//!
//! 引擎任务在一个 `select!` 循环里处理命令、链路事件、新 envelope、
//! 限流到期和重连到期。计时器都在 tokio 的时钟上，测试可以用暂停的时钟驱动。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::connection::{ConnectionManager, ConnectionState, LinkEvent};
use super::queue::OutboundQueue;
use super::throttle::SendThrottle;
use crate::config::EngineConfig;
use crate::error::DeliveryError;
use crate::notification::icon::fetch_with_timeout;
use crate::notification::{
    encode, sanitize, Envelope, HttpIconFetcher, IconFetcher, NoopIconFetcher, NotificationRequest,
    PayloadBuilder,
};
use crate::transport::{Transport, WebSocketTransport};

/// 关闭时等待链路优雅关闭的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// 问候通知
const GREETING_TITLE: &str = "Connected";
const GREETING_TIMEOUT_MS: u64 = 2000;

/// 引擎状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub state: ConnectionState,
    /// 断线期间排队的 envelope 数
    pub queued: usize,
    /// 等待限流到期的 envelope 数
    pub pending: usize,
    /// 当前重连退避（毫秒）
    pub backoff_ms: u64,
    /// 已交给连接发送的通知数（不含问候）
    pub delivered: u64,
    /// 队列溢出丢弃的通知数
    pub dropped: u64,
    /// 因类别关闭而跳过的通知数
    pub skipped: u64,
    pub last_connected_at: Option<DateTime<Utc>>,
    /// 引擎是否已关闭
    pub shut_down: bool,
}

impl EngineStatus {
    fn initial(config: &EngineConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            queued: 0,
            pending: 0,
            backoff_ms: config.delivery.backoff_floor_ms,
            delivered: 0,
            dropped: 0,
            skipped: 0,
            last_connected_at: None,
            shut_down: false,
        }
    }

    /// 已有结果的通知数：已发送、溢出丢弃或按类别跳过
    pub fn settled(&self) -> u64 {
        self.delivered + self.dropped + self.skipped
    }
}

/// 引擎命令
enum Command {
    Connect { force: bool },
    Disconnect,
    UpdateConfig(Box<EngineConfig>),
    Shutdown(oneshot::Sender<()>),
}

/// 准备任务交给引擎任务的结果
enum Prepared {
    Envelope(Envelope),
    /// 类别被关闭，没有生成 envelope
    Skipped,
}

/// 引擎构建器
pub struct EngineBuilder {
    config: EngineConfig,
    transport: Option<Arc<dyn Transport>>,
    icon_fetcher: Option<Arc<dyn IconFetcher>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            transport: None,
            icon_fetcher: None,
        }
    }

    /// 设置传输（默认 WebSocket）
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 设置图标下载（默认 HTTP，关闭远程图标时不下载）
    pub fn icon_fetcher(mut self, fetcher: Arc<dyn IconFetcher>) -> Self {
        self.icon_fetcher = Some(fetcher);
        self
    }

    /// 启动引擎任务（必须在 tokio 运行时内调用）
    pub fn start(self) -> NotificationEngine {
        let config = self.config.normalized();
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::new()));
        let fetcher: Arc<dyn IconFetcher> = match self.icon_fetcher {
            Some(f) => f,
            None if config.icon.fetch_remote => Arc::new(HttpIconFetcher::new()),
            None => Arc::new(NoopIconFetcher),
        };

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (prepared_tx, prepared_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (config_tx, config_rx) = watch::channel(config.clone());
        let (status_tx, status_rx) = watch::channel(EngineStatus::initial(&config));

        let preparer = tokio::spawn(run_preparer(request_rx, config_rx, fetcher, prepared_tx));

        let actor = EngineActor {
            builder: PayloadBuilder::from_config(&config),
            connection: ConnectionManager::new(transport, link_tx, &config),
            queue: OutboundQueue::new(config.delivery.max_queue),
            throttle: SendThrottle::new(Duration::from_millis(config.delivery.min_interval_ms)),
            pending: VecDeque::new(),
            commands: command_rx,
            link_events: link_rx,
            prepared: prepared_rx,
            status: status_tx,
            delivered: 0,
            dropped: 0,
            skipped: 0,
            last_connected_at: None,
            config,
        };
        let actor = tokio::spawn(actor.run());

        NotificationEngine {
            requests: request_tx,
            commands: command_tx,
            config: config_tx,
            status: status_rx,
            tasks: Mutex::new(vec![actor, preparer]),
        }
    }
}

/// 通知投递引擎
pub struct NotificationEngine {
    requests: mpsc::UnboundedSender<NotificationRequest>,
    commands: mpsc::UnboundedSender<Command>,
    config: watch::Sender<EngineConfig>,
    status: watch::Receiver<EngineStatus>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NotificationEngine {
    /// 使用默认传输启动
    pub fn start(config: EngineConfig) -> Self {
        EngineBuilder::new(config).start()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// 提交一条通知，立即返回，不会失败
    pub fn notify(&self, request: NotificationRequest) {
        if self.requests.send(request).is_err() {
            debug!("Engine is shut down, notification discarded");
        }
    }

    /// 便捷入口：标题、原始正文、超时和可选图片
    pub fn notify_text(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
        timeout_ms: u64,
        icon_bytes: Option<Vec<u8>>,
    ) {
        let mut request = NotificationRequest::new(title, body).with_timeout_ms(timeout_ms);
        request.icon_bytes = icon_bytes;
        self.notify(request);
    }

    /// 发起连接（已连接或连接中时不做任何事）
    pub fn connect(&self) {
        self.command(Command::Connect { force: false });
    }

    /// 强制重连：先拆除现有连接
    pub fn reconnect(&self) {
        self.command(Command::Connect { force: true });
    }

    /// 主动断开，不自动重连
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// 应用新的配置快照，端点变化时强制重连
    pub fn update_config(&self, config: EngineConfig) {
        let config = config.normalized();
        self.config.send_replace(config.clone());
        self.command(Command::UpdateConfig(Box::new(config)));
    }

    /// 当前配置快照
    pub fn config(&self) -> EngineConfig {
        self.config.borrow().clone()
    }

    /// 当前状态快照
    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    /// 关闭引擎：停止计时器、关闭连接、清空队列；之后的调用都是 no-op
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }

        let tasks: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Engine is shut down, command ignored");
        }
    }
}

/// 准备任务：按顺序把请求变成 envelope
async fn run_preparer(
    mut requests: mpsc::UnboundedReceiver<NotificationRequest>,
    config: watch::Receiver<EngineConfig>,
    fetcher: Arc<dyn IconFetcher>,
    prepared: mpsc::UnboundedSender<Prepared>,
) {
    while let Some(request) = requests.recv().await {
        let snapshot = config.borrow().clone();
        let result = match prepare(request, &snapshot, fetcher.as_ref()).await {
            Some(envelope) => Prepared::Envelope(envelope),
            None => Prepared::Skipped,
        };
        if prepared.send(result).is_err() {
            break;
        }
    }
}

/// 把一条请求构建成 envelope；类别被关闭时返回 None
pub async fn prepare(
    request: NotificationRequest,
    config: &EngineConfig,
    fetcher: &dyn IconFetcher,
) -> Option<Envelope> {
    if let Some(category) = request.category.as_deref() {
        if !config.is_category_enabled(category) {
            debug!(category = %category, "Category disabled, notification skipped");
            return None;
        }
    }

    let mut icon = request.icon_bytes;
    if icon.is_none() && config.icon.fetch_remote {
        if let Some(url) = request.icon_url.as_deref() {
            let timeout = Duration::from_millis(config.icon.fetch_timeout_ms);
            icon = fetch_with_timeout(fetcher, url, timeout).await;
        }
    }

    let content = sanitize(&request.body);
    let timeout_ms = if request.timeout_ms == 0 {
        config.display.default_timeout_ms
    } else {
        request.timeout_ms
    };

    let record = PayloadBuilder::from_config(config).build(
        &request.title,
        &content,
        timeout_ms,
        icon.as_deref(),
        &content,
    );
    Some(encode(&record, &config.client_name))
}

/// 引擎任务
struct EngineActor {
    config: EngineConfig,
    builder: PayloadBuilder,
    connection: ConnectionManager,
    queue: OutboundQueue,
    throttle: SendThrottle,
    /// 等待限流到期的 envelope（按到期时间排序）
    pending: VecDeque<(Instant, Envelope)>,
    commands: mpsc::UnboundedReceiver<Command>,
    link_events: mpsc::UnboundedReceiver<LinkEvent>,
    prepared: mpsc::UnboundedReceiver<Prepared>,
    status: watch::Sender<EngineStatus>,
    delivered: u64,
    dropped: u64,
    skipped: u64,
    last_connected_at: Option<DateTime<Utc>>,
}

impl EngineActor {
    async fn run(mut self) {
        if self.config.auto_connect {
            self.connect(false);
        }
        self.publish(false);

        loop {
            let due = self.pending.front().map(|(at, _)| *at);
            let reconnect_at = self.connection.reconnect_at();

            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = self.link_events.recv() => self.handle_link_event(event),
                Some(prepared) = self.prepared.recv() => match prepared {
                    Prepared::Envelope(envelope) => self.schedule(envelope),
                    Prepared::Skipped => self.skipped += 1,
                },
                _ = wait_until(due) => self.fire_due(),
                _ = wait_until(reconnect_at) => {
                    let url = self.endpoint();
                    self.connection.on_reconnect_timer(url);
                }
            }

            self.publish(false);
        }
    }

    fn endpoint(&self) -> Result<String, DeliveryError> {
        self.config.endpoint_url().map(|u| u.to_string())
    }

    fn connect(&mut self, force: bool) {
        let url = self.endpoint();
        self.connection.connect(url, force);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { force } => self.connect(force),
            Command::Disconnect => {
                // 不等待链路关闭，关闭过程在链路任务里完成
                drop(self.connection.disconnect());
            }
            Command::UpdateConfig(config) => self.apply_config(*config),
            Command::Shutdown(_) => {}
        }
    }

    fn apply_config(&mut self, config: EngineConfig) {
        let endpoint_changed = self.config.endpoint_differs(&config);
        let auto_connect_enabled = !self.config.auto_connect && config.auto_connect;

        let evicted = self.queue.set_capacity(config.delivery.max_queue);
        self.dropped += evicted as u64;
        self.throttle
            .set_min_interval(Duration::from_millis(config.delivery.min_interval_ms));
        self.connection.reconfigure(&config);
        self.builder = PayloadBuilder::from_config(&config);
        self.config = config;
        info!("Config updated");

        if endpoint_changed
            && (self.config.auto_connect || self.connection.state() != ConnectionState::Disconnected)
        {
            info!(host = %self.config.host, port = self.config.port, "Endpoint changed, reconnecting");
            self.connect(true);
        } else if auto_connect_enabled
            && self.connection.state() == ConnectionState::Disconnected
            && self.connection.reconnect_at().is_none()
        {
            info!("Auto-connect enabled, connecting");
            self.connect(false);
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened {
                generation,
                outbound,
            } => {
                if self.connection.on_opened(generation, outbound) {
                    self.last_connected_at = Some(Utc::now());
                    self.greet();
                    self.drain();
                }
            }
            LinkEvent::OpenFailed { generation, error } => {
                self.connection.on_open_failed(generation, error)
            }
            LinkEvent::Closed { generation, error } => self.connection.on_closed(generation, error),
        }
    }

    /// 连接成功后的问候通知
    fn greet(&mut self) {
        if !self.config.delivery.greeting {
            return;
        }
        let body = format!("{} is ready to show notifications", self.config.display.source_label);
        let record = self
            .builder
            .build(GREETING_TITLE, &body, GREETING_TIMEOUT_MS, None, &body);
        let envelope = encode(&record, &self.config.client_name);
        if self.connection.send(&envelope) {
            self.throttle.mark_sent(Instant::now());
        }
    }

    /// 按顺序发送断线期间积压的 envelope
    fn drain(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let connection = &mut self.connection;
        let sent = self.queue.drain_into(|envelope| connection.send(envelope));
        if sent > 0 {
            self.throttle.mark_sent(Instant::now());
            self.delivered += sent as u64;
        }
        info!(sent, remaining = self.queue.len(), "Drained outbound queue");
    }

    /// 新 envelope：按限流器给出的时间排入待发列表
    fn schedule(&mut self, envelope: Envelope) {
        let due = self.throttle.schedule(Instant::now());
        self.pending.push_back((due, envelope));
    }

    /// 处理所有已到期的 envelope
    fn fire_due(&mut self) {
        let now = Instant::now();
        while self.pending.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, envelope)) = self.pending.pop_front() {
                self.dispatch(envelope, now);
            }
        }
    }

    /// 到期时的发送或入队判断
    fn dispatch(&mut self, envelope: Envelope, now: Instant) {
        // 积压未发完时新流量排在后面，保证顺序
        if self.queue.is_empty() && self.connection.send(&envelope) {
            self.throttle.mark_sent(now);
            self.delivered += 1;
            return;
        }

        if self.queue.push(envelope).is_some() {
            self.dropped += 1;
        }
        debug!(queued = self.queue.len(), state = self.connection.state().as_str(), "Notification queued");

        if self.connection.is_connected() {
            self.drain();
        }
    }

    async fn shutdown(&mut self) {
        self.pending.clear();
        let discarded = self.queue.len();
        self.queue.clear();
        self.throttle.reset();

        if let Some(mut task) = self.connection.disconnect() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Link did not close in time");
                task.abort();
            }
        }
        info!(discarded, "Engine shut down");
        self.publish(true);
    }

    fn publish(&self, shut_down: bool) {
        self.status.send_replace(EngineStatus {
            state: self.connection.state(),
            queued: self.queue.len(),
            pending: self.pending.len(),
            backoff_ms: self.connection.backoff_ms(),
            delivered: self.delivered,
            dropped: self.dropped,
            skipped: self.skipped,
            last_connected_at: self.last_connected_at,
            shut_down,
        });
    }
}

/// 等到指定时间；没有时间时永远等待
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
