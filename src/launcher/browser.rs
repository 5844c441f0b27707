//! Browser handle and teardown.
//!
//! A [`Browser`] owns everything one launch produced: the process, the
//! profile directory and the connection. Teardown releases them in order
//! and runs at most once, whichever of [`Browser::close`], a termination
//! signal, or the drop of the last handle gets there first.
//!
//! | Step | Skipped when |
//! |------|--------------|
//! | `Browser.close` (bounded) | connection already down |
//! | Close connection | never attached |
//! | Kill, or wait then kill | not launched by us |
//! | Remove profile | caller-owned profile |
//!
//! Every step runs even if an earlier one failed; failures are reported
//! together.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{BrowserCommand, GetTargetsResult, TargetCommand, TargetInfo, VersionInfo};
use crate::retry::RetryPolicy;
use crate::transport::{Connection, Session};

use super::process::ProcessGuard;
use super::profile::Profile;
use super::signals::SignalHooks;

// ============================================================================
// LaunchPhase
// ============================================================================

/// Where a launch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchPhase {
    /// Nothing started yet.
    Idle,
    /// Profile prepared, process being started.
    Spawning,
    /// Process running, polling the discovery endpoint.
    AwaitingEndpoint,
    /// Connection open.
    Connected,
    /// Teardown in progress.
    Closing,
    /// Teardown finished.
    Closed,
    /// Launch failed; whatever it started was torn down.
    Failed,
}

impl LaunchPhase {
    /// Returns `true` once nothing is left running.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Default time a browser gets to exit on its own before it is killed.
pub(crate) const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Default bound on the graceful `Browser.close` request.
pub(crate) const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Timings used by teardown.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TeardownConfig {
    pub cleanup: RetryPolicy,
    pub exit_grace: Duration,
    pub close_timeout: Duration,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            cleanup: RetryPolicy::cleanup(),
            exit_grace: DEFAULT_EXIT_GRACE,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Resources owned by one launch.
#[derive(Debug, Default)]
struct LaunchState {
    process: Option<ProcessGuard>,
    profile: Option<Profile>,
    connection: Option<Connection>,
    closed: bool,
}

/// Shared launch state, reachable from every [`Browser`] clone and from the
/// signal hooks.
pub(crate) struct Lifecycle {
    state: AsyncMutex<LaunchState>,
    phase: parking_lot::Mutex<LaunchPhase>,
    hooks: parking_lot::Mutex<Option<SignalHooks>>,
    config: TeardownConfig,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Lifecycle {
    pub(crate) fn new(config: TeardownConfig) -> Arc<Self> {
        Arc::new(Self {
            state: AsyncMutex::new(LaunchState::default()),
            phase: parking_lot::Mutex::new(LaunchPhase::Idle),
            hooks: parking_lot::Mutex::new(None),
            config,
        })
    }

    pub(crate) fn phase(&self) -> LaunchPhase {
        *self.phase.lock()
    }

    pub(crate) fn set_phase(&self, phase: LaunchPhase) {
        let previous = std::mem::replace(&mut *self.phase.lock(), phase);
        debug!(?previous, ?phase, "Launch phase changed");
    }

    /// Records the launch profile.
    ///
    /// Fails if teardown already ran, e.g. after a signal during launch; the
    /// resource is then released on the spot.
    pub(crate) async fn set_profile(&self, profile: Profile) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            profile.remove(&self.config.cleanup).await?;
            return Err(Error::ConnectionClosed);
        }
        state.profile = Some(profile);
        Ok(())
    }

    /// Records the launched process. Fails as [`Lifecycle::set_profile`].
    pub(crate) async fn set_process(&self, mut process: ProcessGuard) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            process.kill().await?;
            return Err(Error::ConnectionClosed);
        }
        state.process = Some(process);
        Ok(())
    }

    /// Records the connection. Fails as [`Lifecycle::set_profile`].
    pub(crate) async fn set_connection(&self, connection: Connection) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            connection.close().await?;
            return Err(Error::ConnectionClosed);
        }
        state.connection = Some(connection);
        Ok(())
    }

    pub(crate) fn set_hooks(&self, hooks: SignalHooks) {
        *self.hooks.lock() = Some(hooks);
    }

    async fn is_process_alive(&self) -> bool {
        self.state
            .lock()
            .await
            .process
            .as_mut()
            .is_some_and(ProcessGuard::is_alive)
    }

    /// Releases every resource of the launch. Runs once; later calls, and
    /// calls racing the first, return `Ok(())` after it finished.
    pub(crate) async fn teardown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        let failed = self.phase() == LaunchPhase::Failed;
        if !failed {
            self.set_phase(LaunchPhase::Closing);
        }

        let mut failures = Vec::new();

        if let Some(connection) = state.connection.take() {
            if connection.is_connected()
                && let Err(e) = connection
                    .send_with_timeout("Browser.close", json!({}), self.config.close_timeout)
                    .await
            {
                // The browser usually drops the socket before answering.
                debug!(error = %e, "Browser.close not acknowledged");
            }

            if let Err(e) = connection.close().await {
                failures.push(e);
            }
        }

        let temporary = state.profile.as_ref().is_some_and(Profile::is_temporary);

        if let Some(mut process) = state.process.take() {
            let result = if temporary {
                process.kill().await
            } else {
                process.wait_or_kill(self.config.exit_grace).await
            };
            if let Err(e) = result {
                warn!(pid = process.pid(), error = %e, "Failed to stop browser process");
                failures.push(e);
            }
        }

        if let Some(profile) = state.profile.take()
            && let Err(e) = profile.remove(&self.config.cleanup).await
        {
            warn!(error = %e, "Failed to remove temporary profile");
            failures.push(e);
        }

        if !failed {
            self.set_phase(LaunchPhase::Closed);
        }

        let result = Error::from_failures(failures);
        if result.is_ok() {
            info!("Browser torn down");
        }
        result
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.closed {
            return;
        }
        state.closed = true;

        debug!("Browser dropped without close, tearing down");

        if let Some(mut process) = state.process.take() {
            process.start_kill();
        }

        if let Some(profile) = state.profile.take()
            && let Err(e) = profile.remove_blocking(&self.config.cleanup)
        {
            warn!(error = %e, "Failed to remove temporary profile on drop");
        }
    }
}

// ============================================================================
// Browser
// ============================================================================

/// A browser this crate launched or connected to.
///
/// Cheap to clone; clones share the launch. Dropping the last clone without
/// [`Browser::close`] kills the process and removes a temporary profile
/// synchronously.
#[derive(Clone)]
pub struct Browser {
    lifecycle: Arc<Lifecycle>,
    connection: Connection,
    pid: Option<u32>,
    profile_dir: Option<PathBuf>,
}

// ============================================================================
// Browser - Display
// ============================================================================

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("pid", &self.pid)
            .field("phase", &self.phase())
            .field("profile_dir", &self.profile_dir)
            .field("connection", &self.connection)
            .finish()
    }
}

// ============================================================================
// Browser - Constructors
// ============================================================================

impl Browser {
    pub(crate) fn new(
        lifecycle: Arc<Lifecycle>,
        connection: Connection,
        pid: Option<u32>,
        profile_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            lifecycle,
            connection,
            pid,
            profile_dir,
        }
    }
}

// ============================================================================
// Browser - Accessors
// ============================================================================

impl Browser {
    /// Returns the connection to the browser.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns the process ID, if this handle launched the browser.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns the profile directory, if this handle launched the browser.
    #[inline]
    #[must_use]
    pub fn profile_dir(&self) -> Option<&Path> {
        self.profile_dir.as_deref()
    }

    /// Returns the lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> LaunchPhase {
        self.lifecycle.phase()
    }

    /// Returns `true` while the launched process is running.
    ///
    /// Always `false` for a browser this handle did not launch.
    pub async fn is_alive(&self) -> bool {
        self.lifecycle.is_process_alive().await
    }
}

// ============================================================================
// Browser - Commands
// ============================================================================

impl Browser {
    /// Returns product and protocol version information.
    ///
    /// # Errors
    ///
    /// As [`Connection::send`], plus [`Error::Json`] for a malformed reply.
    pub async fn version(&self) -> Result<VersionInfo> {
        let value = self.connection.send_command(BrowserCommand::GetVersion).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Lists the browser's targets.
    ///
    /// # Errors
    ///
    /// As [`Browser::version`].
    pub async fn targets(&self) -> Result<Vec<TargetInfo>> {
        let value = self.connection.send_command(TargetCommand::GetTargets).await?;
        let result: GetTargetsResult = serde_json::from_value(value)?;
        Ok(result.target_infos)
    }

    /// Attaches a flat session to the first page target.
    ///
    /// # Errors
    ///
    /// - [`Error::NoTarget`] if the browser has no page target
    /// - As [`Browser::version`] otherwise
    pub async fn attach_first_page(&self) -> Result<Session> {
        let page = self
            .targets()
            .await?
            .into_iter()
            .find(TargetInfo::is_page)
            .ok_or_else(|| {
                Error::no_target(self.connection.endpoint().unwrap_or("connection"))
            })?;

        self.connection.attach_session(page.target_id).await
    }
}

// ============================================================================
// Browser - Lifecycle
// ============================================================================

impl Browser {
    /// Closes the browser and releases everything the launch owns.
    ///
    /// Idempotent: a second call, or a call after a signal tore the browser
    /// down, returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the teardown failure, or [`Error::Teardown`] when several
    /// steps failed. Every step is attempted regardless.
    pub async fn close(&self) -> Result<()> {
        self.lifecycle.teardown().await
    }

    /// Closes the connection and leaves the browser running.
    ///
    /// A launched process is still stopped when the last handle drops.
    ///
    /// # Errors
    ///
    /// As [`Connection::close`].
    pub async fn disconnect(&self) -> Result<()> {
        self.connection.close().await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::memory;

    fn teardown_config() -> TeardownConfig {
        TeardownConfig {
            cleanup: RetryPolicy::new(10, Duration::from_millis(10)),
            exit_grace: Duration::from_millis(200),
            close_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_browser_is_clone_and_debug() {
        fn assert_traits<T: Clone + fmt::Debug + Send + Sync>() {}
        assert_traits::<Browser>();
    }

    #[test]
    fn test_terminal_phases() {
        assert!(LaunchPhase::Closed.is_terminal());
        assert!(LaunchPhase::Failed.is_terminal());
        assert!(!LaunchPhase::Connected.is_terminal());
    }

    #[tokio::test]
    async fn test_teardown_without_resources() {
        let lifecycle = Lifecycle::new(teardown_config());
        lifecycle.teardown().await.expect("teardown");
        assert_eq!(lifecycle.phase(), LaunchPhase::Closed);
    }

    #[tokio::test]
    async fn test_closed_lifecycle_releases_late_resources() {
        let root = tempfile::tempdir().expect("root");
        let lifecycle = Lifecycle::new(teardown_config());
        lifecycle.teardown().await.expect("teardown");

        let profile = Profile::new_temp_in(root.path()).expect("profile");
        let dir = profile.path().to_path_buf();
        assert!(lifecycle.set_profile(profile).await.is_err());
        assert!(!dir.exists());

        let (transport, _remote) = memory::pair();
        let connection = Connection::new(transport);
        assert!(lifecycle.set_connection(connection.clone()).await.is_err());
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn test_version_and_targets() {
        let (transport, mut remote) = memory::pair();
        let connection = Connection::new(transport);
        let browser = Browser::new(
            Lifecycle::new(teardown_config()),
            connection,
            None,
            None,
        );

        let responder = tokio::spawn(async move {
            for _ in 0..2 {
                let request = remote.next_request().await.expect("request");
                let result = match request["method"].as_str() {
                    Some("Browser.getVersion") => json!({
                        "protocolVersion": "1.3",
                        "product": "HeadlessChrome/120.0",
                        "revision": "@abc",
                        "userAgent": "Mozilla/5.0",
                        "jsVersion": "12.0"
                    }),
                    _ => json!({"targetInfos": [{
                        "targetId": "T1",
                        "type": "page",
                        "title": "",
                        "url": "about:blank",
                        "attached": false
                    }]}),
                };
                remote.push(json!({"id": request["id"], "result": result}));
            }
            remote
        });

        let version = browser.version().await.expect("version");
        assert_eq!(version.protocol_version, "1.3");

        let targets = browser.targets().await.expect("targets");
        assert_eq!(targets.len(), 1);
        assert!(targets[0].is_page());

        let _remote = responder.await.expect("responder");
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        use std::process::Stdio;

        use tokio::process::Command;

        fn sleeper() -> ProcessGuard {
            let child = Command::new("sleep")
                .arg("30")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .expect("spawn");
            ProcessGuard::new(child)
        }

        async fn launched(profile: Profile) -> (Browser, memory::RemoteEnd) {
            let (transport, remote) = memory::pair();
            let connection = Connection::new(transport);
            let lifecycle = Lifecycle::new(teardown_config());

            let process = sleeper();
            let pid = process.pid();
            let profile_dir = profile.path().to_path_buf();

            lifecycle.set_profile(profile).await.expect("profile");
            lifecycle.set_process(process).await.expect("process");
            lifecycle
                .set_connection(connection.clone())
                .await
                .expect("connection");
            lifecycle.set_phase(LaunchPhase::Connected);

            let browser = Browser::new(lifecycle, connection, Some(pid), Some(profile_dir));
            (browser, remote)
        }

        #[tokio::test]
        async fn test_close_is_idempotent() {
            let root = tempfile::tempdir().expect("root");
            let (browser, mut remote) =
                launched(Profile::new_temp_in(root.path()).expect("profile")).await;
            let profile_dir = browser.profile_dir().expect("dir").to_path_buf();

            assert!(browser.is_alive().await);

            browser.close().await.expect("close");

            // Graceful close went out first.
            let request = remote.next_request().await.expect("Browser.close");
            assert_eq!(request["method"], "Browser.close");

            assert!(!browser.is_alive().await);
            assert!(!browser.connection().is_connected());
            assert!(!profile_dir.exists());
            assert_eq!(browser.phase(), LaunchPhase::Closed);

            browser.close().await.expect("second close");
            browser.clone().close().await.expect("close from clone");
        }

        #[tokio::test]
        async fn test_close_keeps_caller_profile() {
            let root = tempfile::tempdir().expect("root");
            let dir = root.path().join("mine");
            let (browser, _remote) = launched(Profile::from_path(&dir).expect("profile")).await;

            browser.close().await.expect("close");

            // Process outlived the exit grace and was killed.
            assert!(!browser.is_alive().await);
            assert!(dir.is_dir());
        }

        #[tokio::test]
        async fn test_concurrent_close_tears_down_once() {
            let root = tempfile::tempdir().expect("root");
            let (browser, _remote) =
                launched(Profile::new_temp_in(root.path()).expect("profile")).await;

            let (a, b) = tokio::join!(browser.close(), browser.close());
            a.expect("first");
            b.expect("second");
            assert_eq!(browser.phase(), LaunchPhase::Closed);
        }

        #[tokio::test]
        async fn test_drop_removes_temp_profile() {
            let root = tempfile::tempdir().expect("root");
            let (browser, _remote) =
                launched(Profile::new_temp_in(root.path()).expect("profile")).await;
            let profile_dir = browser.profile_dir().expect("dir").to_path_buf();

            drop(browser);

            assert!(!profile_dir.exists());
        }

        #[tokio::test]
        async fn test_disconnect_leaves_process_running() {
            let root = tempfile::tempdir().expect("root");
            let (browser, _remote) =
                launched(Profile::new_temp_in(root.path()).expect("profile")).await;

            browser.disconnect().await.expect("disconnect");
            assert!(!browser.connection().is_connected());
            assert!(browser.is_alive().await);

            browser.close().await.expect("close");
            assert!(!browser.is_alive().await);
        }
    }
}
