//! WebSocket Transport
//!
//! [`Transport`] implementation over `tokio-tungstenite`. TLS endpoints
//! (`wss://`) use rustls with the webpki root store.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{Inbound, Transport, TransportError, TransportSession};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a new transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn TransportSession>, TransportError> {
        let (socket, response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WebSocketSession { socket }))
    }
}

/// One open WebSocket connection.
struct WebSocketSession {
    socket: Socket,
}

#[async_trait]
impl TransportSession for WebSocketSession {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Inbound, TransportError> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Inbound::Text(text.to_string())),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(Inbound::Text(text)),
                    Err(_) => {
                        tracing::warn!(len = data.len(), "Dropping non-UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((None, String::new()), |f| {
                        (Some(u16::from(f.code)), f.reason.to_string())
                    });
                    return Ok(Inbound::Closed { code, reason });
                }
                // tungstenite answers pings itself on the next read/write
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                None => return Err(TransportError::Closed),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            tracing::debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_invalid_endpoint_fails() {
        let transport = WebSocketTransport::new();

        let result = transport.open("not a url").await;

        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn open_refused_port_fails() {
        let transport = WebSocketTransport::new();

        let result = transport.open("ws://127.0.0.1:1/stream").await;

        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
