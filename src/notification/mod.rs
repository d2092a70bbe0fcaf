//! 通知构建层 - 从原始请求到线上帧
//!
//! 流程：`NotificationRequest` → 清理正文 → 估算高度 → 解析图标 →
//! `NotificationRecord` → `Envelope`。这一层全部是纯函数（图标下载除外），
//! 连接和队列相关的状态都在 `delivery` 模块。

pub mod envelope;
pub mod height;
pub mod icon;
pub mod payload;
pub mod request;
pub mod sanitizer;

pub use envelope::{encode, Envelope};
pub use height::{estimate_height, HeightModel};
pub use icon::{HttpIconFetcher, IconFallback, IconFetcher, NoopIconFetcher};
pub use payload::{NotificationRecord, PayloadBuilder};
pub use request::NotificationRequest;
pub use sanitizer::sanitize;
