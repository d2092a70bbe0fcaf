//! Envelope 编码 - 把通知记录包装成渲染端接收的外层消息
//!
//! 线上帧格式：
//! ```json
//! {"sender": "overlay-notifier", "target": "overlay", "command": "SendNotification",
//!  "jsonData": "{\"type\":1,...}", "rawData": null}
//! ```

use serde::{Deserialize, Serialize};

use super::payload::NotificationRecord;

/// 目标渲染端
pub const TARGET: &str = "overlay";

/// 发送通知命令
pub const COMMAND_SEND_NOTIFICATION: &str = "SendNotification";

/// 外层消息，构建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    sender: String,
    target: String,
    command: String,
    /// 序列化后的 NotificationRecord
    json_data: String,
    raw_data: Option<String>,
}

impl Envelope {
    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn json_data(&self) -> &str {
        &self.json_data
    }

    /// 线上文本帧
    pub fn to_frame(&self) -> String {
        // 字段全是字符串，序列化不会失败
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// 编码通知记录
pub fn encode(record: &NotificationRecord, sender: &str) -> Envelope {
    Envelope {
        sender: sender.to_string(),
        target: TARGET.to_string(),
        command: COMMAND_SEND_NOTIFICATION.to_string(),
        json_data: serde_json::to_string(record).unwrap_or_default(),
        raw_data: None,
    }
}
