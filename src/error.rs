//! Error types for the DevTools client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use cdp_driver::{Connection, Result};
//!
//! async fn example(connection: &Connection) -> Result<()> {
//!     let version = connection.send("Browser.getVersion", serde_json::json!({})).await?;
//!     println!("{version}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Profile`], [`Error::BrowserNotFound`] |
//! | Process | [`Error::ProcessLaunchFailed`], [`Error::DiscoveryTimeout`], [`Error::NoTarget`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::SessionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::InvalidMessage`], [`Error::RequestTimeout`] |
//! | Teardown | [`Error::Cleanup`], [`Error::Teardown`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::SessionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when launcher configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Profile directory error.
    ///
    /// Returned when a user-data directory cannot be created or prepared.
    #[error("Profile error: {message}")]
    Profile {
        /// Description of the profile error.
        message: String,
    },

    /// Browser binary not found.
    #[error("Browser not found at: {path}")]
    BrowserNotFound {
        /// Path where the browser was expected.
        path: PathBuf,
    },

    // ========================================================================
    // Process Errors
    // ========================================================================
    /// Failed to launch the browser process.
    #[error("Failed to launch browser: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    /// The discovery endpoint never became reachable.
    ///
    /// Fatal to the launch attempt. Distinct from [`Error::NoTarget`]: the
    /// process may still be starting, or may not have started at all.
    #[error("Browser discovery endpoint {url} unreachable after {attempts} attempts")]
    DiscoveryTimeout {
        /// Discovery base URL that was polled.
        url: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The discovery endpoint answered but listed no page target.
    #[error("No page target to connect to at {url}")]
    NoTarget {
        /// Discovery base URL that was polled.
        url: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The transport closed or broke.
    ///
    /// Every request outstanding at that moment is rejected with this error.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request issued against, or outstanding on, a detached session.
    #[error("Session closed: {session_id}")]
    SessionClosed {
        /// The detached session.
        session_id: SessionId,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The browser rejected a command.
    ///
    /// Only the request that caused it sees this error.
    #[error("Protocol error {code}: {message}")]
    Protocol {
        /// Error code reported by the browser.
        code: i64,
        /// Error message reported by the browser.
        message: String,
    },

    /// A message or payload did not have the expected shape.
    #[error("Invalid message: {message}")]
    InvalidMessage {
        /// Description of the problem.
        message: String,
    },

    /// A caller-imposed deadline elapsed before the reply arrived.
    #[error("Request {method} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The command method.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Teardown Errors
    // ========================================================================
    /// Temporary profile directory could not be removed.
    #[error("Failed to remove {path} after {attempts} attempts: {message}")]
    Cleanup {
        /// Directory that could not be removed.
        path: PathBuf,
        /// Number of removal attempts.
        attempts: u32,
        /// Last removal error.
        message: String,
    },

    /// Several independent teardown steps failed.
    #[error("Teardown finished with {} failures: {}", .failures.len(), join_failures(.failures))]
    Teardown {
        /// Every failure, in the order the steps ran.
        failures: Vec<Error>,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP error from the discovery endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn join_failures(failures: &[Error]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a profile error.
    #[inline]
    pub fn profile(message: impl Into<String>) -> Self {
        Self::Profile {
            message: message.into(),
        }
    }

    /// Creates a browser not found error.
    #[inline]
    pub fn browser_not_found(path: impl Into<PathBuf>) -> Self {
        Self::BrowserNotFound { path: path.into() }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(err: IoError) -> Self {
        Self::ProcessLaunchFailed {
            message: err.to_string(),
        }
    }

    /// Creates a discovery timeout error.
    #[inline]
    pub fn discovery_timeout(url: impl Into<String>, attempts: u32) -> Self {
        Self::DiscoveryTimeout {
            url: url.into(),
            attempts,
        }
    }

    /// Creates a no target error.
    #[inline]
    pub fn no_target(url: impl Into<String>) -> Self {
        Self::NoTarget { url: url.into() }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a session closed error.
    #[inline]
    pub fn session_closed(session_id: SessionId) -> Self {
        Self::SessionClosed { session_id }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Creates an invalid message error.
    #[inline]
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a cleanup error.
    #[inline]
    pub fn cleanup(path: &Path, attempts: u32, last_error: Option<IoError>) -> Self {
        Self::Cleanup {
            path: path.to_path_buf(),
            attempts,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt was made".to_string()),
        }
    }

    /// Folds the failures of a teardown run into one result.
    ///
    /// No failures is success, a single failure is returned as is, and
    /// several are wrapped in [`Error::Teardown`].
    pub fn from_failures(mut failures: Vec<Error>) -> Result<()> {
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Self::Teardown { failures }),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error was raised because a session went away.
    #[inline]
    #[must_use]
    pub fn is_session_error(&self) -> bool {
        matches!(self, Self::SessionClosed { .. })
    }

    /// Returns the protocol error code, if the browser rejected a command.
    #[inline]
    #[must_use]
    pub fn protocol_code(&self) -> Option<i64> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
