//! Connection and event loop.
//!
//! This module handles one physical connection to the browser, including
//! request/reply correlation, event routing, and the session table.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that owns the transport and handles:
//!
//! - Incoming messages (replies, events)
//! - Outgoing writes queued by [`Connection::send`] and [`Session::send`]
//! - Session lifecycle tracking from `Target` events
//! - Teardown when the transport ends or [`Connection::close`] is called
//!
//! # Synthetic Events
//!
//! | Event | Registry | Payload |
//! |-------|----------|---------|
//! | `Connection.disconnected` | root | `{"reason": ...}` |
//! | `Session.detached` | the session's | `{"sessionId": ...}` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::events::EventRegistry;
use crate::identifiers::{RequestId, SessionId, TargetId};
use crate::protocol::{
    AttachToTargetResult, Command, Event, Message, ParsedEvent, Request, Response, TargetCommand,
};

use super::session::{Session, SessionInner};
use super::websocket::WebSocketTransport;
use super::{ProtocolClient, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Emitted on the root registry once the connection is gone.
pub const DISCONNECTED_EVENT: &str = "Connection.disconnected";

/// Emitted on a session's registry once it is detached.
pub const SESSION_DETACHED_EVENT: &str = "Session.detached";

// ============================================================================
// Types
// ============================================================================

/// An outstanding request awaiting its reply.
struct PendingRequest {
    method: String,
    session_id: Option<SessionId>,
    response_tx: oneshot::Sender<Result<Value>>,
}

/// Outstanding requests plus the connected flag they are checked against.
struct Correlation {
    pending: FxHashMap<RequestId, PendingRequest>,
    connected: bool,
}

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a serialized request.
    Write { request_id: RequestId, text: String },
    /// Close the transport and acknowledge once teardown finished.
    Shutdown { done_tx: oneshot::Sender<()> },
}

/// State shared by every handle to one connection.
pub(crate) struct ConnectionInner {
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    next_id: AtomicU64,
    correlation: Mutex<Correlation>,
    sessions: RwLock<FxHashMap<SessionId, Session>>,
    events: EventRegistry,
    endpoint: Option<String>,
}

// ============================================================================
// Connection
// ============================================================================

/// Connection to a browser debugging endpoint.
///
/// Handles request/reply correlation and event routing. The connection
/// spawns an internal event loop task, which ends when the transport closes,
/// when [`Connection::close`] is called, or when the last handle is dropped.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and cheap to clone; clones share the same
/// connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.endpoint)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_count())
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Opens a WebSocket to `endpoint` and starts the event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if `endpoint` is not a `ws://` or `wss://` URL
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let transport = WebSocketTransport::connect(endpoint).await?;
        info!(endpoint, "Connected to browser");
        Ok(Self::spawn(transport, Some(endpoint.to_string())))
    }

    /// Starts a connection over an already open transport.
    ///
    /// Must be called within a tokio runtime.
    pub fn new<T: Transport>(transport: T) -> Self {
        Self::spawn(transport, None)
    }

    fn spawn<T: Transport>(transport: T, endpoint: Option<String>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(ConnectionInner {
            command_tx,
            next_id: AtomicU64::new(1),
            correlation: Mutex::new(Correlation {
                pending: FxHashMap::default(),
                connected: true,
            }),
            sessions: RwLock::new(FxHashMap::default()),
            events: EventRegistry::new(),
            endpoint,
        });

        tokio::spawn(run_event_loop(
            transport,
            command_rx,
            Arc::downgrade(&inner),
        ));

        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }

    /// Sends a command on the root scope and waits for its reply.
    ///
    /// There is no default deadline; see [`Connection::send_with_timeout`].
    /// Dropping the returned future forgets the request locally, a late
    /// reply is then discarded.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is or becomes closed
    /// - [`Error::Protocol`] if the browser rejects the command
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.inner.send_raw(method, params, None).await
    }

    /// Sends a command with a caller-side deadline.
    ///
    /// # Errors
    ///
    /// As [`Connection::send`], plus [`Error::RequestTimeout`].
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

    /// Sends a typed command.
    ///
    /// # Errors
    ///
    /// As [`Connection::send`].
    pub async fn send_command(&self, command: impl Into<Command>) -> Result<Value> {
        let (method, params) = command.into().into_parts()?;
        self.send(&method, params).await
    }

    /// Attaches a flat session to `target_id`.
    ///
    /// # Errors
    ///
    /// As [`Connection::send`], plus [`Error::Json`] for a malformed reply.
    pub async fn attach_session(&self, target_id: impl Into<TargetId>) -> Result<Session> {
        self.inner.attach(target_id.into(), None).await
    }

    /// Waits for the next `name` event on the root scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection closes first.
    pub async fn wait_for_event(&self, name: &str) -> Result<Value> {
        let rx = self.inner.register_wait(name, None)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Returns the root event registry.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventRegistry {
        &self.inner.events
    }

    /// Returns the attached session with `session_id`.
    #[must_use]
    pub fn session(&self, session_id: &SessionId) -> Option<Session> {
        self.inner.sessions.read().get(session_id).cloned()
    }

    /// Returns every attached session.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.sessions.read().values().cloned().collect()
    }

    /// Returns the number of attached sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// Returns the number of requests awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.correlation.lock().pending.len()
    }

    /// Returns `true` until the transport ends.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Returns the WebSocket URL, when opened with [`Connection::connect`].
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.inner.endpoint.as_deref()
    }

    /// Closes the connection and waits for teardown.
    ///
    /// Every outstanding request is rejected with
    /// [`Error::ConnectionClosed`] and every session is detached before this
    /// returns. Closing twice succeeds.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for transports whose close can
    /// fail in a way callers must see.
    pub async fn close(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();

        if self
            .inner
            .command_tx
            .send(ConnectionCommand::Shutdown { done_tx })
            .is_err()
        {
            return Ok(());
        }

        let _ = done_rx.await;
        Ok(())
    }
}

#[async_trait]
impl ProtocolClient for Connection {
    async fn send(&self, method: &str, params: Value) -> Result<Value> {
        Connection::send(self, method, params).await
    }

    fn events(&self) -> &EventRegistry {
        &self.inner.events
    }
}

// ============================================================================
// ConnectionInner - Requests
// ============================================================================

/// Removes a pending entry when its send future completes or is dropped.
struct PendingGuard<'a> {
    inner: &'a ConnectionInner,
    request_id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self
            .inner
            .correlation
            .lock()
            .pending
            .remove(&self.request_id)
            .is_some()
        {
            trace!(request_id = %self.request_id, "Request abandoned by caller");
        }
    }
}

impl ConnectionInner {
    #[inline]
    pub(crate) fn is_connected(&self) -> bool {
        self.correlation.lock().connected
    }

    /// Sends a request, scoped to `scope` when given.
    pub(crate) async fn send_raw(
        &self,
        method: &str,
        params: Value,
        scope: Option<&SessionInner>,
    ) -> Result<Value> {
        let request_id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session_id = scope.map(|session| session.session_id.clone());

        let text = serde_json::to_string(
            &Request::new(request_id, method, &params).with_session(session_id.as_ref()),
        )?;

        let (response_tx, response_rx) = oneshot::channel();

        // Checked under the lock teardown drains with, so no entry is stranded.
        {
            let mut correlation = self.correlation.lock();
            if !correlation.connected {
                return Err(Error::ConnectionClosed);
            }
            if let Some(session) = scope
                && session.detached.load(Ordering::Acquire)
            {
                return Err(Error::session_closed(session.session_id.clone()));
            }
            correlation.pending.insert(
                request_id,
                PendingRequest {
                    method: method.to_string(),
                    session_id,
                    response_tx,
                },
            );
        }

        let _guard = PendingGuard {
            inner: self,
            request_id,
        };

        self.command_tx
            .send(ConnectionCommand::Write { request_id, text })
            .map_err(|_| Error::ConnectionClosed)?;

        trace!(%request_id, method, "Request queued");

        response_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Rejects one request, used when its write failed or its reply could
    /// not be decoded.
    fn reject(&self, request_id: RequestId, err: Error) {
        let pending = self.correlation.lock().pending.remove(&request_id);
        match pending {
            Some(pending) => {
                warn!(%request_id, method = %pending.method, error = %err, "Request failed");
                let _ = pending.response_tx.send(Err(err));
            }
            None => {
                debug!(%request_id, error = %err, "Nothing pending to reject");
            }
        }
    }

    /// Completes the request a reply belongs to.
    fn complete(&self, response: Response) {
        let pending = self.correlation.lock().pending.remove(&response.id);

        match pending {
            Some(pending) => {
                trace!(request_id = %response.id, method = %pending.method, "Reply received");
                let _ = pending.response_tx.send(response.into_result());
            }
            None => {
                debug!(request_id = %response.id, "Discarding reply for unknown request");
            }
        }
    }

    /// Registers a one-shot wait on the root or a session registry.
    pub(crate) fn register_wait(
        &self,
        name: &str,
        scope: Option<&SessionInner>,
    ) -> Result<oneshot::Receiver<Value>> {
        let correlation = self.correlation.lock();

        match scope {
            None if !correlation.connected => Err(Error::ConnectionClosed),
            None => Ok(self.events.wait_for(name)),
            Some(session) if session.detached.load(Ordering::Acquire) => {
                Err(Error::session_closed(session.session_id.clone()))
            }
            Some(session) => Ok(session.events.wait_for(name)),
        }
    }
}

// ============================================================================
// ConnectionInner - Sessions
// ============================================================================

impl ConnectionInner {
    /// Attaches a flat session, as a child of `parent` when given.
    pub(crate) async fn attach(
        self: &Arc<Self>,
        target_id: TargetId,
        parent: Option<&SessionInner>,
    ) -> Result<Session> {
        let (method, params) = Command::from(TargetCommand::attach(target_id.clone())).into_parts()?;
        let result = self.send_raw(&method, params, parent).await?;
        let AttachToTargetResult { session_id } = serde_json::from_value(result)?;

        Ok(self.register_session(
            session_id,
            target_id,
            parent.map(|session| session.session_id.clone()),
        ))
    }

    /// Returns the registered session, registering it if new.
    fn register_session(
        self: &Arc<Self>,
        session_id: SessionId,
        target_id: TargetId,
        parent: Option<SessionId>,
    ) -> Session {
        let mut sessions = self.sessions.write();

        sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                debug!(%session_id, %target_id, ?parent, "Session attached");
                Session::new(session_id, target_id, parent, Arc::downgrade(self))
            })
            .clone()
    }

    /// Detaches a session and its descendants locally. Returns `false` if
    /// the session was already gone.
    pub(crate) fn detach_session(&self, session_id: &SessionId) -> bool {
        let Some(session) = self.sessions.write().remove(session_id) else {
            return false;
        };

        let children: Vec<SessionId> = self
            .sessions
            .read()
            .values()
            .filter(|child| child.parent_id() == Some(session_id))
            .map(|child| child.id().clone())
            .collect();

        for child in &children {
            self.detach_session(child);
        }

        let rejected: Vec<PendingRequest> = {
            let mut correlation = self.correlation.lock();
            session.inner.detached.store(true, Ordering::Release);
            correlation
                .pending
                .extract_if(|_, pending| pending.session_id.as_ref() == Some(session_id))
                .map(|(_, pending)| pending)
                .collect()
        };

        let count = rejected.len();
        for pending in rejected {
            let _ = pending
                .response_tx
                .send(Err(Error::session_closed(session_id.clone())));
        }

        let events = session.events();
        events.emit(SESSION_DETACHED_EVENT, &json!({ "sessionId": session_id }));
        events.clear();

        debug!(%session_id, rejected = count, "Session detached");
        true
    }
}

// ============================================================================
// ConnectionInner - Dispatch
// ============================================================================

impl ConnectionInner {
    /// Handles an incoming text message.
    fn dispatch(self: &Arc<Self>, text: &str) {
        match Message::parse(text) {
            Ok(Message::Response(response)) => self.complete(response),
            Ok(Message::Event(event)) => self.route_event(event),
            Ok(Message::MalformedReply { id, reason }) => {
                self.reject(id, Error::invalid_message(reason));
            }
            Err(e) => warn!(error = %e, "Failed to parse incoming message"),
        }
    }

    /// Routes an event to the root or to its session, tracking session
    /// lifecycle on the way.
    fn route_event(self: &Arc<Self>, event: Event) {
        let lifecycle = match event.method.as_str() {
            "Target.attachedToTarget" | "Target.detachedFromTarget" => Some(event.parse()),
            _ => None,
        };

        if let Some(ParsedEvent::AttachedToTarget(attached)) = &lifecycle {
            self.register_session(
                attached.session_id.clone(),
                attached.target_info.target_id.clone(),
                event.session_id.clone(),
            );
        }

        match &event.session_id {
            None => {
                self.events.emit(&event.method, &event.params);
            }
            Some(session_id) => {
                let session = self.sessions.read().get(session_id).cloned();
                match session {
                    Some(session) => {
                        session.events().emit(&event.method, &event.params);
                    }
                    None => {
                        debug!(%session_id, method = %event.method, "Dropping event for unknown session");
                    }
                }
            }
        }

        if let Some(ParsedEvent::DetachedFromTarget(detached)) = &lifecycle {
            self.detach_session(&detached.session_id);
        }
    }

    /// Tears down every outstanding request and session.
    fn mark_disconnected(&self, reason: &str) {
        let drained: Vec<PendingRequest> = {
            let mut correlation = self.correlation.lock();
            if !correlation.connected {
                return;
            }
            correlation.connected = false;
            correlation.pending.drain().map(|(_, pending)| pending).collect()
        };

        let count = drained.len();
        for pending in drained {
            let _ = pending.response_tx.send(Err(Error::ConnectionClosed));
        }

        let roots: Vec<SessionId> = self
            .sessions
            .read()
            .values()
            .filter(|session| session.parent_id().is_none())
            .map(|session| session.id().clone())
            .collect();
        for session_id in &roots {
            self.detach_session(session_id);
        }

        // Orphans whose parent was never registered.
        let rest: Vec<SessionId> = self.sessions.read().keys().cloned().collect();
        for session_id in &rest {
            self.detach_session(session_id);
        }

        self.events
            .emit(DISCONNECTED_EVENT, &json!({ "reason": reason }));
        self.events.clear();

        info!(reason, rejected = count, "Connection closed");
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that owns the transport.
async fn run_event_loop<T: Transport>(
    mut transport: T,
    mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    inner: Weak<ConnectionInner>,
) {
    let mut shutdown_ack = None;

    let reason = loop {
        tokio::select! {
            // Incoming messages from the browser
            frame = transport.recv_text() => {
                match frame {
                    Some(Ok(text)) => {
                        let Some(inner) = inner.upgrade() else {
                            break "connection dropped";
                        };
                        inner.dispatch(&text);
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "Transport error");
                        break "transport error";
                    }

                    None => {
                        debug!("Transport closed by remote");
                        break "closed by remote";
                    }
                }
            }

            // Writes and shutdown from the API
            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Write { request_id, text }) => {
                        if let Err(e) = transport.send_text(text).await
                            && let Some(inner) = inner.upgrade()
                        {
                            inner.reject(request_id, Error::connection(e.to_string()));
                        }
                    }

                    Some(ConnectionCommand::Shutdown { done_tx }) => {
                        debug!("Shutdown command received");
                        shutdown_ack = Some(done_tx);
                        break "closed by client";
                    }

                    None => {
                        debug!("Command channel closed");
                        break "connection dropped";
                    }
                }
            }
        }
    };

    if let Err(e) = transport.close().await {
        debug!(error = %e, "Failed to close transport");
    }

    if let Some(inner) = inner.upgrade() {
        inner.mark_disconnected(reason);
    }

    // Writes queued after the loop ended were rejected by the drain above.
    command_rx.close();
    while let Ok(command) = command_rx.try_recv() {
        if let ConnectionCommand::Shutdown { done_tx } = command {
            let _ = done_tx.send(());
        }
    }

    if let Some(done_tx) = shutdown_ack {
        let _ = done_tx.send(());
    }

    debug!(reason, "Event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
