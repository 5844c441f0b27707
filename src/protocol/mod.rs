//! DevTools protocol message types.
//!
//! This module defines the wire envelopes exchanged with the browser.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Browser | Command request |
//! | `Response` | Browser → Local | Command reply (has `id`) |
//! | `Event` | Browser → Local | Notification (no `id`) |
//!
//! Any message may carry a `sessionId` when it belongs to a flat session.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Typed commands used by the core |
//! | `event` | Event types |
//! | `message` | Incoming reply/event discrimination |
//! | `request` | Request and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Typed commands organized by domain.
pub mod command;

/// Event message types.
pub mod event;

/// Incoming message decoding.
pub mod message;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    AttachToTargetResult, BrowserCommand, Command, GetTargetsResult, TargetCommand, TargetInfo,
    VersionInfo,
};
pub use event::{AttachedToTarget, DetachedFromTarget, Event, ParsedEvent};
pub use message::Message;
pub use request::{RemoteError, Request, Response};
