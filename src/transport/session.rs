//! Flat sessions multiplexed over one connection.
//!
//! A [`Session`] is a logical channel to one target. It shares the
//! connection's transport: outgoing commands carry its `sessionId`, and
//! events tagged with that id are emitted on its own registry.
//!
//! Sessions nest. Attaching from a session makes the new session its child,
//! and detaching a session detaches its children too. Siblings and the root
//! connection are never affected.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::events::EventRegistry;
use crate::identifiers::{SessionId, TargetId};
use crate::protocol::{Command, TargetCommand};

use super::ProtocolClient;
use super::connection::{Connection, ConnectionInner};

// ============================================================================
// Types
// ============================================================================

/// State shared by every handle to one session.
pub(crate) struct SessionInner {
    pub(crate) session_id: SessionId,
    pub(crate) target_id: TargetId,
    pub(crate) parent: Option<SessionId>,
    pub(crate) events: EventRegistry,
    /// Written under the connection's correlation lock.
    pub(crate) detached: AtomicBool,
}

// ============================================================================
// Session
// ============================================================================

/// A flat session attached to a target.
///
/// Cheap to clone; all clones refer to the same session. Holds only a weak
/// reference to its connection.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
    connection: Weak<ConnectionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.inner.session_id)
            .field("target_id", &self.inner.target_id)
            .field("parent", &self.inner.parent)
            .field("detached", &self.is_detached())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        session_id: SessionId,
        target_id: TargetId,
        parent: Option<SessionId>,
        connection: Weak<ConnectionInner>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                session_id,
                target_id,
                parent,
                events: EventRegistry::new(),
                detached: AtomicBool::new(false),
            }),
            connection,
        }
    }

    /// Returns the session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Returns the target this session is attached to.
    #[inline]
    #[must_use]
    pub fn target_id(&self) -> &TargetId {
        &self.inner.target_id
    }

    /// Returns the parent session, `None` when attached from the root.
    #[inline]
    #[must_use]
    pub fn parent_id(&self) -> Option<&SessionId> {
        self.inner.parent.as_ref()
    }

    /// Returns `true` once the session was detached.
    #[inline]
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::Acquire)
    }

    /// Returns the connection, if it is still alive.
    #[must_use]
    pub fn connection(&self) -> Option<Connection> {
        self.connection.upgrade().map(Connection::from_inner)
    }

    /// Returns this session's event registry.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventRegistry {
        &self.inner.events
    }

    /// Sends a command scoped to this session and waits for its reply.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the session is or becomes detached
    /// - [`Error::ConnectionClosed`] if the connection is gone
    /// - [`Error::Protocol`] if the browser rejects the command
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        let connection = self.upgrade()?;
        connection.send_raw(method, params, Some(&*self.inner)).await
    }

    /// Sends a command with a caller-side deadline.
    ///
    /// # Errors
    ///
    /// As [`Session::send`], plus [`Error::RequestTimeout`].
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value> {
        timeout(deadline, self.send(method, params))
            .await
            .map_err(|_| Error::request_timeout(method, deadline.as_millis() as u64))?
    }

    /// Attaches a child session to `target_id`.
    ///
    /// # Errors
    ///
    /// As [`Session::send`].
    pub async fn attach_session(&self, target_id: impl Into<TargetId>) -> Result<Session> {
        let connection = self.upgrade()?;
        connection.attach(target_id.into(), Some(&*self.inner)).await
    }

    /// Waits for the next `name` event on this session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session detaches first.
    pub async fn wait_for_event(&self, name: &str) -> Result<Value> {
        let connection = self.upgrade()?;
        let rx = connection.register_wait(name, Some(&*self.inner))?;
        drop(connection);

        rx.await.map_err(|_| self.closed())
    }

    /// Detaches the session.
    ///
    /// Rejects its outstanding requests with [`Error::SessionClosed`], drops
    /// its listeners and detaches its children, then asks the browser to
    /// detach as well. Detaching twice, or after the connection closed,
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns the browser's error if it refuses the detach.
    pub async fn detach(&self) -> Result<()> {
        let Some(connection) = self.connection.upgrade() else {
            return Ok(());
        };
        // Only the caller that removed the session asks the browser.
        if !connection.detach_session(self.id()) {
            return Ok(());
        }

        let (method, params) = Command::from(TargetCommand::DetachFromTarget {
            session_id: self.id().clone(),
        })
        .into_parts()?;

        match connection.send_raw(&method, params, None).await {
            Ok(_) => Ok(()),
            Err(Error::ConnectionClosed) => Ok(()),
            Err(e) => {
                debug!(session_id = %self.id(), error = %e, "Browser refused detach");
                Err(e)
            }
        }
    }

    #[inline]
    fn upgrade(&self) -> Result<Arc<ConnectionInner>> {
        self.connection.upgrade().ok_or(Error::ConnectionClosed)
    }

    #[inline]
    fn closed(&self) -> Error {
        Error::session_closed(self.id().clone())
    }
}

#[async_trait]
impl ProtocolClient for Session {
    async fn send(&self, method: &str, params: Value) -> Result<Value> {
        Session::send(self, method, params).await
    }

    fn events(&self) -> &EventRegistry {
        &self.inner.events
    }
}

// ============================================================================
// Tests
// ============================================================================
