//! WebSocket 传输 - 基于 tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{FrameLink, Transport};
use crate::error::DeliveryError;

/// WebSocket 连接工厂
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn open(&self, url: &str) -> Result<Box<dyn FrameLink>, DeliveryError> {
        let (stream, response) =
            connect_async(url)
                .await
                .map_err(|e| DeliveryError::TransportOpenFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        debug!(url = %url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WebSocketLink { stream }))
    }
}

/// 一条 WebSocket 连接
struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameLink for WebSocketLink {
    async fn send(&mut self, frame: String) -> Result<(), DeliveryError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| DeliveryError::TransportSendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, DeliveryError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                // ping/pong 由 tungstenite 自动处理
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "WebSocket close frame received");
                    return None;
                }
                Err(e) => return Some(Err(DeliveryError::TransportError(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}
