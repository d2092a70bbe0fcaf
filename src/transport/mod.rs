//! 传输层抽象 - 引擎只依赖 `Transport` / `FrameLink` 两个 trait
//!
//! # 设计目标
//! 1. 统一接口：WebSocket 和内存实现都实现 `Transport`
//! 2. 只发不解析：收到的帧原样返回，由调用方决定是否记录
//! 3. 可测试：内存传输可以拒绝连接、断开连接、记录发送的帧

use async_trait::async_trait;

use crate::error::DeliveryError;

pub mod memory;
pub mod websocket;

pub use memory::{MemoryTransport, SentFrame};
pub use websocket::WebSocketTransport;

/// 一条已打开的连接
#[async_trait]
pub trait FrameLink: Send {
    /// 发送一个文本帧
    async fn send(&mut self, frame: String) -> Result<(), DeliveryError>;

    /// 等待下一个入站帧；连接关闭时返回 None
    ///
    /// 必须可以安全取消（会在 `select!` 中使用）。
    async fn recv(&mut self) -> Option<Result<String, DeliveryError>>;

    /// 主动关闭连接
    async fn close(&mut self);
}

/// 连接工厂
#[async_trait]
pub trait Transport: Send + Sync {
    /// 传输名称（用于日志）
    fn name(&self) -> &str;

    /// 打开到 `url` 的连接
    async fn open(&self, url: &str) -> Result<Box<dyn FrameLink>, DeliveryError>;
}
