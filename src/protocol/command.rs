//! Typed commands used by the client core.
//!
//! Per-domain command stubs are generated elsewhere and go through
//! [`ProtocolClient::send`](crate::ProtocolClient::send) with raw params. The
//! few commands the connection, session and launcher issue themselves are
//! typed here.
//!
//! # Command Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Target` | attach, detach, list targets |
//! | `Browser` | close, version |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{SessionId, TargetId};

// ============================================================================
// Command Wrapper
// ============================================================================

/// All typed commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// Target domain commands.
    Target(TargetCommand),
    /// Browser domain commands.
    Browser(BrowserCommand),
}

impl Command {
    /// Splits the command into its method name and params object.
    ///
    /// Commands without params produce an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if the command does not serialize to
    /// a `{method, params}` object.
    pub fn into_parts(self) -> Result<(String, Value)> {
        let mut object = match serde_json::to_value(&self)? {
            Value::Object(object) => object,
            other => {
                return Err(Error::invalid_message(format!(
                    "command serialized to {other}"
                )));
            }
        };

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(Error::invalid_message("command without method")),
        };
        let params = object
            .remove("params")
            .unwrap_or_else(|| Value::Object(Map::new()));

        Ok((method, params))
    }
}

impl From<TargetCommand> for Command {
    #[inline]
    fn from(command: TargetCommand) -> Self {
        Self::Target(command)
    }
}

impl From<BrowserCommand> for Command {
    #[inline]
    fn from(command: BrowserCommand) -> Self {
        Self::Browser(command)
    }
}

// ============================================================================
// Target Commands
// ============================================================================

/// Target domain commands for session management.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum TargetCommand {
    /// Attach a flat session to a target.
    #[serde(rename = "Target.attachToTarget", rename_all = "camelCase")]
    AttachToTarget {
        /// Target to attach to.
        target_id: TargetId,
        /// Always `true`: sessions share the connection.
        flatten: bool,
    },

    /// Detach a flat session.
    #[serde(rename = "Target.detachFromTarget", rename_all = "camelCase")]
    DetachFromTarget {
        /// Session to detach.
        session_id: SessionId,
    },

    /// List available targets.
    #[serde(rename = "Target.getTargets")]
    GetTargets,
}

impl TargetCommand {
    /// Creates a flat attach command.
    #[inline]
    #[must_use]
    pub fn attach(target_id: TargetId) -> Self {
        Self::AttachToTarget {
            target_id,
            flatten: true,
        }
    }
}

// ============================================================================
// Browser Commands
// ============================================================================

/// Browser domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum BrowserCommand {
    /// Close the browser gracefully.
    #[serde(rename = "Browser.close")]
    Close,

    /// Get version information.
    #[serde(rename = "Browser.getVersion")]
    GetVersion,
}

// ============================================================================
// Result Types
// ============================================================================

/// Result of `Target.attachToTarget`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResult {
    /// The new session.
    pub session_id: SessionId,
}

/// Result of `Target.getTargets`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTargetsResult {
    /// Every known target.
    pub target_infos: Vec<TargetInfo>,
}

/// Description of a target as reported by the `Target` domain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target id.
    pub target_id: TargetId,
    /// Target type (`page`, `iframe`, `service_worker`, ...).
    #[serde(rename = "type")]
    pub target_type: String,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// URL.
    #[serde(default)]
    pub url: String,
    /// Whether a client is attached.
    #[serde(default)]
    pub attached: bool,
    /// Opener target, if any.
    #[serde(default)]
    pub opener_id: Option<TargetId>,
    /// Browser context the target belongs to.
    #[serde(default)]
    pub browser_context_id: Option<String>,
}

impl TargetInfo {
    /// Returns `true` for page targets.
    #[inline]
    #[must_use]
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

/// Result of `Browser.getVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Protocol version.
    pub protocol_version: String,
    /// Product name and version.
    pub product: String,
    /// Product revision.
    #[serde(default)]
    pub revision: String,
    /// User agent.
    #[serde(default)]
    pub user_agent: String,
    /// V8 version.
    #[serde(default)]
    pub js_version: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_attach_to_target() {
        let command = Command::from(TargetCommand::attach(TargetId::from("T1")));
        let (method, params) = command.into_parts().expect("parts");

        assert_eq!(method, "Target.attachToTarget");
        assert_eq!(params, json!({"targetId": "T1", "flatten": true}));
    }

    #[test]
    fn test_detach_from_target() {
        let command = Command::from(TargetCommand::DetachFromTarget {
            session_id: SessionId::from("S1"),
        });
        let (method, params) = command.into_parts().expect("parts");

        assert_eq!(method, "Target.detachFromTarget");
        assert_eq!(params, json!({"sessionId": "S1"}));
    }

    #[test]
    fn test_unit_command_has_empty_params() {
        let (method, params) = Command::from(BrowserCommand::Close)
            .into_parts()
            .expect("parts");

        assert_eq!(method, "Browser.close");
        assert_eq!(params, json!({}));
    }

    #[test]
    fn test_target_info_parse() {
        let info: TargetInfo = serde_json::from_value(json!({
            "targetId": "T1",
            "type": "page",
            "title": "Example",
            "url": "https://example.com/",
            "attached": false,
            "browserContextId": "C1"
        }))
        .expect("parse");

        assert_eq!(info.target_type, "page");
        assert_eq!(info.browser_context_id.as_deref(), Some("C1"));
        assert!(info.opener_id.is_none());
    }
}
