//! Event message types.
//!
//! Events are notifications the browser sends without a matching request.
//! They carry no `id`, and a `sessionId` when raised inside a flat session.
//!
//! # Lifecycle Events
//!
//! The connection itself watches a few `Target` events to keep its session
//! table in sync:
//!
//! | Method | Effect |
//! |--------|--------|
//! | `Target.attachedToTarget` | registers the new session |
//! | `Target.detachedFromTarget` | detaches the session |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::{Value, from_value};

use crate::identifiers::{SessionId, TargetId};

use super::command::TargetInfo;

// ============================================================================
// Event
// ============================================================================

/// An event notification from the browser.
///
/// # Format
///
/// ```json
/// {
///   "method": "Domain.eventName",
///   "params": { ... },
///   "sessionId": "optional"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,

    /// Session the event was raised in; `None` for the root connection.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl Event {
    /// Returns the domain name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let event = Event { method: "Page.loadEventFired".into(), .. };
    /// assert_eq!(event.domain(), "Page");
    /// ```
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }

    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        match self.method.as_str() {
            "Target.attachedToTarget" => from_value::<AttachedToTarget>(self.params.clone())
                .map(ParsedEvent::AttachedToTarget)
                .unwrap_or_else(|_| self.unknown()),

            "Target.detachedFromTarget" => from_value::<DetachedFromTarget>(self.params.clone())
                .map(ParsedEvent::DetachedFromTarget)
                .unwrap_or_else(|_| self.unknown()),

            "Target.targetCrashed" => ParsedEvent::TargetCrashed {
                target_id: TargetId::new(self.get_string("targetId")),
                status: self.get_string("status"),
            },

            "Inspector.detached" => ParsedEvent::InspectorDetached {
                reason: self.get_string("reason"),
            },

            _ => self.unknown(),
        }
    }

    fn unknown(&self) -> ParsedEvent {
        ParsedEvent::Unknown {
            method: self.method.clone(),
            params: self.params.clone(),
        }
    }

    /// Gets a string from params.
    #[inline]
    fn get_string(&self, key: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
#[derive(Debug, Clone)]
pub enum ParsedEvent {
    /// A flat session was attached to a target.
    AttachedToTarget(AttachedToTarget),

    /// A flat session was detached.
    DetachedFromTarget(DetachedFromTarget),

    /// A target crashed.
    TargetCrashed {
        /// The crashed target.
        target_id: TargetId,
        /// Termination status.
        status: String,
    },

    /// The debugging connection is about to be terminated.
    InspectorDetached {
        /// Detach reason.
        reason: String,
    },

    /// Any other event.
    Unknown {
        /// Event method.
        method: String,
        /// Event params.
        params: Value,
    },
}

/// Params of `Target.attachedToTarget`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedToTarget {
    /// The new session.
    pub session_id: SessionId,
    /// The target the session is attached to.
    pub target_info: TargetInfo,
    /// Whether the target is paused waiting for the debugger.
    #[serde(default)]
    pub waiting_for_debugger: bool,
}

/// Params of `Target.detachedFromTarget`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedFromTarget {
    /// The detached session.
    pub session_id: SessionId,
    /// The target, when reported.
    #[serde(default)]
    pub target_id: Option<TargetId>,
}

// ============================================================================
// Tests
// ============================================================================
