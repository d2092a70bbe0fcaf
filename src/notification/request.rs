//! 通知请求 - 事件源交给引擎的原始输入

use serde::{Deserialize, Serialize};

/// 一次"通知我"请求
///
/// `body` 是未经清理的原始文本；`timeout_ms` 为 0 时使用配置里的默认超时。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub timeout_ms: u64,
    /// 调用方直接提供的图片数据
    #[serde(skip)]
    pub icon_bytes: Option<Vec<u8>>,
    /// 远程图标地址（仅在没有 icon_bytes 时下载）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// 通知类别，用于按类别开关
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl NotificationRequest {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_icon_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.icon_bytes = Some(bytes);
        self
    }

    pub fn with_icon_url(mut self, url: impl Into<String>) -> Self {
        self.icon_url = Some(url.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_line() {
        let req: NotificationRequest = serde_json::from_str(
            r#"{"title": "Alice", "body": "hi <@1>", "category": "direct"}"#,
        )
        .unwrap();
        assert_eq!(req.title, "Alice");
        assert_eq!(req.timeout_ms, 0);
        assert_eq!(req.category.as_deref(), Some("direct"));
        assert!(req.icon_bytes.is_none());
    }

    #[test]
    fn test_builder() {
        let req = NotificationRequest::new("t", "b")
            .with_timeout_ms(3000)
            .with_icon_url("https://cdn/x.png");
        assert_eq!(req.timeout_ms, 3000);
        assert_eq!(req.icon_url.as_deref(), Some("https://cdn/x.png"));
    }
}
