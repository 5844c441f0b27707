//! In-memory loopback transport.
//!
//! [`pair`] returns a [`MemoryTransport`] to hand to
//! [`Connection::new`](crate::Connection::new) and the [`RemoteEnd`] that
//! plays the browser: it reads the requests the connection writes and pushes
//! replies and events back.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::Transport;

// ============================================================================
// Constructor
// ============================================================================

/// Creates a connected transport pair.
#[must_use]
pub fn pair() -> (MemoryTransport, RemoteEnd) {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

    let transport = MemoryTransport {
        outgoing: Some(outgoing_tx),
        incoming: incoming_rx,
    };
    let remote = RemoteEnd {
        requests: outgoing_rx,
        replies: Some(incoming_tx),
    };

    (transport, remote)
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Local half of an in-memory pair.
#[derive(Debug)]
pub struct MemoryTransport {
    outgoing: Option<mpsc::UnboundedSender<String>>,
    incoming: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outgoing
            .as_ref()
            .ok_or(Error::ConnectionClosed)?
            .send(text)
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn recv_text(&mut self) -> Option<Result<String>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.outgoing = None;
        self.incoming.close();
        Ok(())
    }
}

// ============================================================================
// RemoteEnd
// ============================================================================

/// Browser half of an in-memory pair.
#[derive(Debug)]
pub struct RemoteEnd {
    requests: mpsc::UnboundedReceiver<String>,
    replies: Option<mpsc::UnboundedSender<String>>,
}

impl RemoteEnd {
    /// Waits for the next request written by the connection.
    ///
    /// Returns `None` once the local half is closed.
    pub async fn next_request(&mut self) -> Option<Value> {
        let text = self.requests.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Pushes a message to the connection.
    ///
    /// Returns `false` if the local half is gone.
    pub fn push(&self, message: Value) -> bool {
        self.push_text(message.to_string())
    }

    /// Pushes a raw text frame to the connection.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.replies
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    /// Ends the stream as if the browser went away.
    pub fn hang_up(&mut self) {
        self.replies = None;
    }
}
