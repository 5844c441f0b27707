//! CDP Driver - Chrome DevTools Protocol client core.
//!
//! This library speaks the DevTools protocol over one WebSocket: it
//! correlates replies to requests, multiplexes flat target sessions over the
//! shared socket, dispatches events to per-scope listeners, and supervises
//! the browser process it launched.
//!
//! # Architecture
//!
//! - **Connection**: one socket, one event loop task, numeric request ids
//! - **Session**: a target attached with `flatten: true`; its messages carry
//!   a `sessionId` and share the connection's id space
//! - **Events**: every scope owns an [`EventRegistry`]; unknown sessions are
//!   dropped, never misrouted
//! - **Launcher**: spawn, `/json` discovery, signal-safe teardown
//!
//! Per-domain command bindings are not part of this crate; they build on
//! [`ProtocolClient::send`].
//!
//! # Quick Start
//!
//! ```no_run
//! use cdp_driver::{Launcher, Listener, ProtocolClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let browser = Launcher::builder().build()?.launch().await?;
//!
//!     let session = browser.attach_first_page().await?;
//!     let loaded = Listener::new(|params| println!("loaded: {params}"));
//!     session.on("Page.loadEventFired", &loaded);
//!
//!     session.send("Page.enable", serde_json::json!({})).await?;
//!     session
//!         .send("Page.navigate", serde_json::json!({"url": "https://example.com"}))
//!         .await?;
//!
//!     browser.close().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Listener registry |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`launcher`] | Process lifecycle: [`Launcher`], [`Browser`] |
//! | [`protocol`] | Wire message types |
//! | [`retry`] | Bounded retry policy |
//! | [`transport`] | [`Connection`], [`Session`], transports |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Per-scope event listener registry.
pub mod events;

/// Type-safe identifiers for requests, sessions and targets.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Browser process lifecycle.
///
/// Use [`Launcher::builder()`] to configure and start a browser.
pub mod launcher;

/// Wire message types.
///
/// Requests, responses, events and the typed commands the core issues.
pub mod protocol;

/// Bounded retry policy shared by discovery and profile cleanup.
pub mod retry;

/// Transport layer: connection, sessions and transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use transport::connection::{DISCONNECTED_EVENT, SESSION_DETACHED_EVENT};
pub use transport::{Connection, ProtocolClient, Session, Transport};

// Event types
pub use events::{EventRegistry, Listener};

// Launcher types
pub use launcher::{
    Browser, ExitSignal, LaunchOptions, LaunchPhase, Launcher, LauncherBuilder, Profile,
    SignalConfig,
};

// Retry types
pub use retry::RetryPolicy;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{RequestId, SessionId, TargetId};
