//! 图标解析 - 图片数据编码、回退图标与远程图标下载

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DeliveryError;

/// 没有图片数据时使用的图标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IconFallback {
    /// 渲染端内置图标关键字，如 "default" / "warning" / "error"
    Keyword(String),
    /// 渲染端本地可访问的图片路径
    Path(String),
    /// 已经 base64 编码的图片数据
    Encoded(String),
}

impl Default for IconFallback {
    fn default() -> Self {
        Self::Keyword("default".to_string())
    }
}

impl IconFallback {
    /// 线上的 icon 字段值
    pub fn wire_value(&self) -> &str {
        match self {
            Self::Keyword(s) | Self::Path(s) | Self::Encoded(s) => s,
        }
    }

    /// 是否为内嵌图片数据
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Encoded(_))
    }
}

/// 已解析的图标：(是否内嵌, icon 字段)
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIcon {
    pub embedded: bool,
    pub data: String,
}

/// 解析图标来源：调用方给了图片就编码内嵌，否则使用回退图标
pub fn resolve_icon(icon_bytes: Option<&[u8]>, fallback: &IconFallback) -> ResolvedIcon {
    match icon_bytes {
        Some(bytes) if !bytes.is_empty() => ResolvedIcon {
            embedded: true,
            data: STANDARD.encode(bytes),
        },
        _ => ResolvedIcon {
            embedded: fallback.is_embedded(),
            data: fallback.wire_value().to_string(),
        },
    }
}

/// 远程图标下载
#[async_trait]
pub trait IconFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DeliveryError>;
}

/// 基于 HTTP 的图标下载
#[derive(Debug, Clone)]
pub struct HttpIconFetcher {
    client: Client,
}

impl HttpIconFetcher {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for HttpIconFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IconFetcher for HttpIconFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DeliveryError> {
        let fail = |reason: String| DeliveryError::AssetFetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// 不下载任何东西（关闭远程图标时使用）
#[derive(Debug, Clone, Default)]
pub struct NoopIconFetcher;

#[async_trait]
impl IconFetcher for NoopIconFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DeliveryError> {
        Err(DeliveryError::AssetFetchFailed {
            url: url.to_string(),
            reason: "remote icons disabled".to_string(),
        })
    }
}

/// 带超时下载图标，失败时返回 None 由调用方走回退图标
pub async fn fetch_with_timeout(
    fetcher: &dyn IconFetcher,
    url: &str,
    timeout: Duration,
) -> Option<Vec<u8>> {
    match tokio::time::timeout(timeout, fetcher.fetch(url)).await {
        Ok(Ok(bytes)) => {
            debug!(url = %url, size = bytes.len(), "Icon fetched");
            Some(bytes)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Icon fetch failed, using fallback icon");
            None
        }
        Err(_) => {
            let err = DeliveryError::AssetFetchFailed {
                url: url.to_string(),
                reason: format!("timed out after {:?}", timeout),
            };
            warn!(error = %err, "Icon fetch failed, using fallback icon");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_are_embedded() {
        let icon = resolve_icon(Some(&[1, 2, 3]), &IconFallback::default());
        assert!(icon.embedded);
        assert_eq!(icon.data, "AQID");
    }

    #[test]
    fn test_keyword_fallback_not_embedded() {
        let icon = resolve_icon(None, &IconFallback::Keyword("warning".to_string()));
        assert!(!icon.embedded);
        assert_eq!(icon.data, "warning");
    }

    #[test]
    fn test_empty_bytes_use_fallback() {
        let icon = resolve_icon(Some(&[]), &IconFallback::Path("C:/icons/bell.png".to_string()));
        assert!(!icon.embedded);
        assert_eq!(icon.data, "C:/icons/bell.png");
    }

    #[test]
    fn test_encoded_fallback_is_embedded() {
        let icon = resolve_icon(None, &IconFallback::Encoded("iVBORw0KGgo=".to_string()));
        assert!(icon.embedded);
        assert_eq!(icon.data, "iVBORw0KGgo=");
    }

    #[test]
    fn test_fallback_serde_shape() {
        let json = serde_json::to_value(IconFallback::Path("/a.png".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "path", "value": "/a.png"}));
    }

    struct SlowFetcher;

    #[async_trait]
    impl IconFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, DeliveryError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![1])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_falls_back() {
        let got = fetch_with_timeout(&SlowFetcher, "https://x/icon.png", Duration::from_secs(1)).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_noop_fetcher_fails() {
        let got = fetch_with_timeout(&NoopIconFetcher, "https://x/icon.png", Duration::from_secs(1)).await;
        assert!(got.is_none());
    }
}
