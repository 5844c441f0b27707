//! Browser launcher.
//!
//! The [`Launcher`] starts a browser process and connects to it:
//!
//! | Phase | Work | On failure |
//! |-------|------|------------|
//! | `Spawning` | resolve profile, start process, install signal hooks | |
//! | `AwaitingEndpoint` | poll `/json` for a page WebSocket URL | teardown |
//! | `Connected` | open the connection | teardown |
//!
//! A failed launch never leaves a process or a temporary profile behind.
//!
//! # Example
//!
//! ```no_run
//! use cdp_driver::Launcher;
//!
//! # async fn example() -> cdp_driver::Result<()> {
//! let launcher = Launcher::builder().build()?;
//! let browser = launcher.launch().await?;
//!
//! let version = browser.version().await?;
//! println!("{}", version.product);
//!
//! browser.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::transport::Connection;

use super::browser::{Browser, LaunchPhase, Lifecycle, TeardownConfig};
use super::builder::LauncherBuilder;
use super::discovery::Discovery;
use super::options::LaunchOptions;
use super::process::ProcessGuard;
use super::profile::Profile;
use super::signals::{SignalConfig, SignalHooks};

// ============================================================================
// Types
// ============================================================================

/// Resolved launcher configuration.
#[derive(Debug)]
pub(crate) struct LaunchConfig {
    /// Browser executable.
    pub binary: PathBuf,

    /// Process options.
    pub options: LaunchOptions,

    /// Directory temporary profiles are created under.
    pub scratch_root: PathBuf,

    /// Discovery polling.
    pub discovery: RetryPolicy,

    /// Profile removal retries.
    pub cleanup: RetryPolicy,

    /// Exit grace for caller-owned profiles.
    pub exit_grace: Duration,

    /// Bound on `Browser.close`.
    pub close_timeout: Duration,

    /// Signals that trigger teardown.
    pub signals: SignalConfig,
}

impl LaunchConfig {
    fn teardown(&self) -> TeardownConfig {
        TeardownConfig {
            cleanup: self.cleanup,
            exit_grace: self.exit_grace,
            close_timeout: self.close_timeout,
        }
    }
}

// ============================================================================
// Launcher
// ============================================================================

/// Starts browsers and connects to them.
///
/// Cheap to clone; one launcher can start any number of browsers, each with
/// its own process, profile and connection.
#[derive(Clone)]
pub struct Launcher {
    inner: Arc<LaunchConfig>,
}

// ============================================================================
// Launcher - Display
// ============================================================================

impl fmt::Debug for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launcher")
            .field("binary", &self.inner.binary)
            .field("port", &self.inner.options.port)
            .field("headless", &self.inner.options.headless)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Launcher - Public API
// ============================================================================

impl Launcher {
    /// Creates a configuration builder for the launcher.
    #[inline]
    #[must_use]
    pub fn builder() -> LauncherBuilder {
        LauncherBuilder::new()
    }

    pub(crate) fn from_config(config: LaunchConfig) -> Self {
        Self {
            inner: Arc::new(config),
        }
    }

    /// Returns the browser executable.
    #[inline]
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.inner.binary
    }

    /// Returns the process options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &LaunchOptions {
        &self.inner.options
    }

    /// Returns the directory temporary profiles are created under.
    #[inline]
    #[must_use]
    pub fn scratch_root(&self) -> &Path {
        &self.inner.scratch_root
    }

    /// Starts a browser and connects to its first page.
    ///
    /// # Errors
    ///
    /// - [`Error::Profile`] if the profile directory cannot be prepared
    /// - [`Error::ProcessLaunchFailed`] if the process cannot be started
    /// - [`Error::DiscoveryTimeout`] if the browser never served `/json`
    /// - [`Error::NoTarget`] if it served no connectable page
    /// - [`Error::WebSocket`] if the connection cannot be opened
    ///
    /// Whatever was started is torn down before the error is returned.
    pub async fn launch(&self) -> Result<Browser> {
        let lifecycle = Lifecycle::new(self.inner.teardown());

        match self.start(&lifecycle).await {
            Ok(browser) => Ok(browser),
            Err(e) => {
                warn!(error = %e, phase = ?lifecycle.phase(), "Launch failed, tearing down");
                lifecycle.set_phase(LaunchPhase::Failed);

                if let Err(teardown) = lifecycle.teardown().await {
                    warn!(error = %teardown, "Teardown after failed launch incomplete");
                }
                Err(e)
            }
        }
    }

    /// Connects to a running browser.
    ///
    /// `url` is either a WebSocket URL, or an `http(s)` discovery base whose
    /// first page is connected to. The returned browser owns no process;
    /// [`Browser::close`] still asks it to close.
    ///
    /// # Errors
    ///
    /// As the discovery and connection phases of [`Launcher::launch`].
    pub async fn connect(&self, url: &str) -> Result<Browser> {
        connect_with(url, &self.inner.discovery, self.inner.teardown()).await
    }
}

// ============================================================================
// Launcher - Phases
// ============================================================================

impl Launcher {
    async fn start(&self, lifecycle: &Arc<Lifecycle>) -> Result<Browser> {
        let config = &*self.inner;

        lifecycle.set_phase(LaunchPhase::Spawning);

        let profile = self.prepare_profile()?;
        let profile_dir = profile.as_ref().map(|profile| profile.path().to_path_buf());
        if let Some(profile) = profile {
            lifecycle.set_profile(profile).await?;
        }

        let process = self.spawn(profile_dir.as_deref())?;
        let pid = process.pid();
        lifecycle.set_process(process).await?;

        let weak = Arc::downgrade(lifecycle);
        let hooks = SignalHooks::install(config.signals, move |signal| async move {
            if let Some(lifecycle) = weak.upgrade()
                && let Err(e) = lifecycle.teardown().await
            {
                warn!(%signal, error = %e, "Teardown after signal incomplete");
            }
        })?;
        lifecycle.set_hooks(hooks);

        lifecycle.set_phase(LaunchPhase::AwaitingEndpoint);

        let discovery = Discovery::new(config.options.discovery_url())?;
        let endpoint = discovery.wait_for_page_endpoint(&config.discovery).await?;

        let connection = Connection::connect(&endpoint).await?;
        lifecycle.set_connection(connection.clone()).await?;

        lifecycle.set_phase(LaunchPhase::Connected);
        info!(pid, endpoint, "Browser launched");

        Ok(Browser::new(
            Arc::clone(lifecycle),
            connection,
            Some(pid),
            profile_dir,
        ))
    }

    /// Resolves the profile: the caller's directory, a fresh temporary one,
    /// or none when the caller's args already name one.
    fn prepare_profile(&self) -> Result<Option<Profile>> {
        let options = &self.inner.options;

        if let Some(dir) = &options.user_data_dir {
            return Profile::from_path(dir).map(Some);
        }

        if options.needs_profile() {
            return Profile::new_temp_in(&self.inner.scratch_root).map(Some);
        }

        Ok(None)
    }

    fn spawn(&self, profile_dir: Option<&Path>) -> Result<ProcessGuard> {
        let config = &*self.inner;
        let args = config.options.to_args(profile_dir);

        debug!(binary = %config.binary.display(), ?args, "Spawning browser");

        let child = Command::new(&config.binary)
            .args(&args)
            .envs(config.options.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::process_launch_failed)?;

        let process = ProcessGuard::new(child);
        info!(pid = process.pid(), "Browser process started");
        Ok(process)
    }
}

// ============================================================================
// Connect
// ============================================================================

/// Connects to a running browser with default timings.
///
/// See [`Launcher::connect`]; this variant needs no browser binary.
///
/// # Errors
///
/// As [`Launcher::connect`].
pub async fn connect(url: &str) -> Result<Browser> {
    connect_with(url, &RetryPolicy::discovery(), TeardownConfig::default()).await
}

async fn connect_with(
    url: &str,
    discovery: &RetryPolicy,
    teardown: TeardownConfig,
) -> Result<Browser> {
    let endpoint = if url.starts_with("http://") || url.starts_with("https://") {
        Discovery::new(url)?.wait_for_page_endpoint(discovery).await?
    } else {
        url.to_string()
    };

    let connection = Connection::connect(&endpoint).await?;

    let lifecycle = Lifecycle::new(teardown);
    lifecycle.set_connection(connection.clone()).await?;
    lifecycle.set_phase(LaunchPhase::Connected);

    Ok(Browser::new(lifecycle, connection, None, None))
}

// ============================================================================
// Tests
// ============================================================================
