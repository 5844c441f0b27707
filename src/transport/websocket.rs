//! WebSocket transport over `tokio-tungstenite`.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

use super::Transport;

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// A client WebSocket to a browser debugging endpoint.
pub struct WebSocketTransport {
    stream: WsStream,
}

impl WebSocketTransport {
    /// Opens a WebSocket to `endpoint`.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the URL is not `ws://` or `wss://`
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| Error::connection(format!("invalid endpoint {endpoint}: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::connection(format!(
                "endpoint {endpoint} is not a WebSocket URL"
            )));
        }

        let (stream, _) = connect_async(url.as_str()).await?;
        debug!(endpoint, "WebSocket connected");

        Ok(Self { stream })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),

                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return None;
                }

                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,

                Err(e) => return Some(Err(Error::WebSocket(e))),

                // Binary, Ping, Pong and raw frames carry no protocol messages
                Ok(other) => trace!(kind = ?other, "Ignoring non-text frame"),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(Error::WebSocket(e)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
