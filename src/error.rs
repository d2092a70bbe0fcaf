//! 错误类型 - 投递引擎内部的失败分类
//!
//! 所有错误都在引擎内部被吸收：要么进入重连调度，要么降级继续，
//! 不会传递给调用方，也不会导致宿主进程退出。

use thiserror::Error;

/// 投递引擎错误
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// 配置数值非法（在本地通过下限/裁剪修复，仅记录日志）
    #[error("invalid config value for `{field}`: {reason}")]
    ConfigInvalid { field: &'static str, reason: String },

    /// 无法建立传输连接
    #[error("failed to open transport to {url}: {reason}")]
    TransportOpenFailed { url: String, reason: String },

    /// 已打开的连接写入失败（该帧丢失，不重新入队）
    #[error("failed to send frame: {0}")]
    TransportSendFailed(String),

    /// 对端关闭连接
    #[error("transport closed")]
    TransportClosed,

    /// 连接上的异步错误
    #[error("transport error: {0}")]
    TransportError(String),

    /// 图标下载失败（回退到默认图标）
    #[error("icon fetch failed for {url}: {reason}")]
    AssetFetchFailed { url: String, reason: String },
}

/// 配置文件读写错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot locate config directory")]
    NoConfigDir,

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
