//! 投递层 - 连接生命周期、重连退避、断线队列与发送限流
//!
//! # 使用示例
//! ```ignore
//! use overlay_notifier::{EngineConfig, NotificationEngine, NotificationRequest};
//!
//! let engine = NotificationEngine::start(EngineConfig::load()?);
//! engine.notify(NotificationRequest::new("Alice", "hey **there** <@123>"));
//! // ...
//! engine.shutdown().await;
//! ```

pub mod backoff;
pub mod connection;
pub mod engine;
pub mod queue;
pub mod throttle;

pub use backoff::Backoff;
pub use connection::{ConnectionManager, ConnectionState, LinkEvent};
pub use engine::{EngineBuilder, EngineStatus, NotificationEngine};
pub use queue::OutboundQueue;
pub use throttle::SendThrottle;
