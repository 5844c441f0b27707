//! Transport layer and the protocol client surface.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌─────────────────┐
//! │  Session  ───┐   │                              │                 │
//! │  Session  ───┼─► │         WebSocket            │  Browser        │
//! │  Connection ─┘   │◄────────────────────────────►│  (debug port)   │
//! │  (event loop)    │   one socket, flat sessions  │                 │
//! └──────────────────┘                              └─────────────────┘
//! ```
//!
//! Every session shares the connection's transport. Outgoing messages carry
//! a `sessionId`, incoming ones are routed by it.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Correlation engine and event loop |
//! | `session` | Flat sessions multiplexed over a connection |
//! | `websocket` | `tokio-tungstenite` transport |
//! | `memory` | In-memory loopback transport |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::events::{EventRegistry, Listener};
use crate::protocol::Command;

// ============================================================================
// Submodules
// ============================================================================

/// Correlation engine and event loop.
pub mod connection;

/// In-memory loopback transport.
pub mod memory;

/// Flat sessions.
pub mod session;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use memory::{MemoryTransport, RemoteEnd};
pub use session::Session;
pub use websocket::WebSocketTransport;

// ============================================================================
// Transport
// ============================================================================

/// A duplex channel of text frames.
///
/// Owned by a connection's event loop, which is its only caller.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Writes one frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Reads the next frame, `None` once the peer closed.
    ///
    /// Must be cancel safe: it races the outgoing command queue.
    async fn recv_text(&mut self) -> Option<Result<String>>;

    /// Closes the channel. Closing an already closed channel succeeds.
    async fn close(&mut self) -> Result<()>;
}

// ============================================================================
// ProtocolClient
// ============================================================================

/// Scope that commands can be sent on and events listened to.
///
/// Implemented by [`Connection`] (root scope) and [`Session`]. Generated
/// domain bindings build on this trait only.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Sends `method` with `params` and waits for its reply.
    async fn send(&self, method: &str, params: Value) -> Result<Value>;

    /// The registry events of this scope are emitted on.
    fn events(&self) -> &EventRegistry;

    /// Sends a typed command.
    async fn send_command(&self, command: Command) -> Result<Value> {
        let (method, params) = command.into_parts()?;
        self.send(&method, params).await
    }

    /// Registers a persistent listener. See [`EventRegistry::on`].
    fn on(&self, name: &str, listener: &Listener) -> bool {
        self.events().on(name, listener)
    }

    /// Registers a one-shot listener. See [`EventRegistry::once`].
    fn once(&self, name: &str, listener: &Listener) -> bool {
        self.events().once(name, listener)
    }

    /// Removes a listener. See [`EventRegistry::off`].
    fn off(&self, name: &str, listener: &Listener) -> bool {
        self.events().off(name, listener)
    }
}
