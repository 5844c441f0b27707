//! Termination signal hooks.
//!
//! A launched browser must not outlive its owner. The hooks installed here
//! run the browser's teardown when the owning process receives an
//! interrupt, terminate or hangup signal, then exit the process with the
//! conventional `128 + signo` status.
//!
//! | Signal | Unix | Elsewhere | Exit status |
//! |--------|------|-----------|-------------|
//! | Interrupt | `SIGINT` | Ctrl-C | 130 |
//! | Terminate | `SIGTERM` | not hooked | 143 |
//! | Hangup | `SIGHUP` | not hooked | 129 |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

// ============================================================================
// ExitSignal
// ============================================================================

/// A termination signal the hooks react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitSignal {
    /// `SIGINT` / Ctrl-C.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
    /// `SIGHUP`.
    Hangup,
}

impl ExitSignal {
    /// Returns the signal number.
    #[inline]
    #[must_use]
    pub const fn number(self) -> i32 {
        match self {
            Self::Hangup => 1,
            Self::Interrupt => 2,
            Self::Terminate => 15,
        }
    }

    /// Returns the conventional exit status after this signal.
    #[inline]
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        128 + self.number()
    }
}

impl fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
        };
        f.write_str(name)
    }
}

// ============================================================================
// SignalConfig
// ============================================================================

/// Which signals trigger teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalConfig {
    /// Hook `SIGINT` / Ctrl-C.
    pub interrupt: bool,
    /// Hook `SIGTERM`.
    pub terminate: bool,
    /// Hook `SIGHUP`.
    pub hangup: bool,
    /// Exit the process with `128 + signo` once teardown finished.
    pub exit_on_signal: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            interrupt: true,
            terminate: true,
            hangup: true,
            exit_on_signal: true,
        }
    }
}

impl SignalConfig {
    /// Hooks no signal at all.
    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            interrupt: false,
            terminate: false,
            hangup: false,
            exit_on_signal: false,
        }
    }

    /// Returns `true` if at least one signal is hooked.
    #[inline]
    #[must_use]
    pub const fn any(&self) -> bool {
        self.interrupt || self.terminate || self.hangup
    }
}

// ============================================================================
// SignalHooks
// ============================================================================

/// Installed signal hooks.
///
/// Dropping the hooks does not uninstall them: once a signal is hooked the
/// runtime keeps intercepting it, so the task stays armed to perform the
/// exit the signal would otherwise have caused.
#[derive(Debug)]
pub struct SignalHooks {
    task: Option<JoinHandle<()>>,
}

impl SignalHooks {
    /// Installs hooks per `config` and runs `on_signal` at most once, for the
    /// first signal received.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if a signal handler cannot be
    /// registered.
    pub fn install<F, Fut>(config: SignalConfig, on_signal: F) -> Result<Self>
    where
        F: FnOnce(ExitSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !config.any() {
            return Ok(Self { task: None });
        }

        let listener = SignalListener::register(config)?;

        let task = tokio::spawn(async move {
            let Some(signal) = listener.recv().await else {
                return;
            };

            warn!(%signal, "Termination signal received, tearing down browser");
            on_signal(signal).await;

            if config.exit_on_signal {
                debug!(code = signal.exit_code(), "Exiting after signal");
                std::process::exit(signal.exit_code());
            }
        });

        debug!(?config, "Signal hooks installed");
        Ok(Self { task: Some(task) })
    }

    /// Returns `true` while a hook task is waiting for a signal.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

// ============================================================================
// SignalListener
// ============================================================================

/// Signal streams, registered synchronously so no signal sent after
/// [`SignalHooks::install`] returns is missed.
#[cfg(unix)]
struct SignalListener {
    interrupt: Option<tokio::signal::unix::Signal>,
    terminate: Option<tokio::signal::unix::Signal>,
    hangup: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl SignalListener {
    fn register(config: SignalConfig) -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let hook = |enabled: bool, kind: SignalKind| -> Result<_> {
            Ok(if enabled { Some(signal(kind)?) } else { None })
        };

        Ok(Self {
            interrupt: hook(config.interrupt, SignalKind::interrupt())?,
            terminate: hook(config.terminate, SignalKind::terminate())?,
            hangup: hook(config.hangup, SignalKind::hangup())?,
        })
    }

    async fn recv(mut self) -> Option<ExitSignal> {
        async fn next(stream: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
            match stream {
                Some(stream) => stream.recv().await,
                None => std::future::pending().await,
            }
        }

        tokio::select! {
            Some(()) = next(&mut self.interrupt) => Some(ExitSignal::Interrupt),
            Some(()) = next(&mut self.terminate) => Some(ExitSignal::Terminate),
            Some(()) = next(&mut self.hangup) => Some(ExitSignal::Hangup),
            else => None,
        }
    }
}

#[cfg(not(unix))]
struct SignalListener {
    interrupt: bool,
}

#[cfg(not(unix))]
impl SignalListener {
    fn register(config: SignalConfig) -> Result<Self> {
        Ok(Self {
            interrupt: config.interrupt,
        })
    }

    async fn recv(self) -> Option<ExitSignal> {
        if !self.interrupt {
            return None;
        }
        tokio::signal::ctrl_c().await.ok()?;
        Some(ExitSignal::Interrupt)
    }
}

// ============================================================================
// Tests
// ============================================================================
