//! Overlay Notifier - 把聊天通知投递到游戏内覆盖层渲染端

pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod notification;
pub mod transport;

pub use config::{DeliveryConfig, DisplayConfig, EngineConfig, IconConfig, DEFAULT_PORT};
pub use delivery::{ConnectionState, EngineBuilder, EngineStatus, NotificationEngine};
pub use error::{ConfigError, DeliveryError};
pub use notification::{
    encode, estimate_height, sanitize, Envelope, HeightModel, IconFallback, IconFetcher,
    NotificationRecord, NotificationRequest, PayloadBuilder,
};
pub use transport::{MemoryTransport, Transport, WebSocketTransport};
