//! Builder pattern for launcher configuration.
//!
//! Provides a fluent API for configuring and creating [`Launcher`] instances.
//!
//! # Example
//!
//! ```no_run
//! use cdp_driver::{LaunchOptions, Launcher};
//!
//! # fn example() -> cdp_driver::Result<()> {
//! let launcher = Launcher::builder()
//!     .binary("/usr/bin/chromium")
//!     .options(LaunchOptions::new().with_port(9333))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

use super::browser::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_EXIT_GRACE};
use super::core::{LaunchConfig, Launcher};
use super::options::LaunchOptions;
use super::profile::default_scratch_root;
use super::signals::SignalConfig;

// ============================================================================
// Constants
// ============================================================================

/// Environment variable naming the browser binary.
pub const BROWSER_PATH_ENV: &str = "CHROME_PATH";

/// Executable names searched on `PATH`, in order.
const BINARY_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

// ============================================================================
// LauncherBuilder
// ============================================================================

/// Builder for configuring a [`Launcher`] instance.
///
/// Use [`Launcher::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct LauncherBuilder {
    binary: Option<PathBuf>,
    options: LaunchOptions,
    scratch_root: Option<PathBuf>,
    discovery: RetryPolicy,
    cleanup: RetryPolicy,
    exit_grace: Duration,
    close_timeout: Duration,
    signals: SignalConfig,
}

impl Default for LauncherBuilder {
    fn default() -> Self {
        Self {
            binary: None,
            options: LaunchOptions::new(),
            scratch_root: None,
            discovery: RetryPolicy::discovery(),
            cleanup: RetryPolicy::cleanup(),
            exit_grace: DEFAULT_EXIT_GRACE,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            signals: SignalConfig::default(),
        }
    }
}

// ============================================================================
// LauncherBuilder Implementation
// ============================================================================

impl LauncherBuilder {
    /// Creates a new builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path to the browser binary.
    ///
    /// When unset, `CHROME_PATH` is consulted, then `PATH`.
    #[inline]
    #[must_use]
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Sets the process options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: LaunchOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the directory temporary profiles are created under.
    #[inline]
    #[must_use]
    pub fn scratch_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(path.into());
        self
    }

    /// Sets how long to poll the discovery endpoint.
    #[inline]
    #[must_use]
    pub fn discovery_policy(mut self, policy: RetryPolicy) -> Self {
        self.discovery = policy;
        self
    }

    /// Sets how long to retry removing a temporary profile.
    #[inline]
    #[must_use]
    pub fn cleanup_policy(mut self, policy: RetryPolicy) -> Self {
        self.cleanup = policy;
        self
    }

    /// Sets how long a browser on a caller-owned profile may take to exit
    /// after `Browser.close` before it is killed.
    #[inline]
    #[must_use]
    pub fn exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace = grace;
        self
    }

    /// Sets the bound on the graceful `Browser.close` request.
    #[inline]
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Sets which signals trigger teardown.
    #[inline]
    #[must_use]
    pub fn signals(mut self, signals: SignalConfig) -> Self {
        self.signals = signals;
        self
    }

    /// Builds the launcher with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::BrowserNotFound`] if the configured binary doesn't exist
    /// - [`Error::Config`] if no binary can be found or options are invalid
    pub fn build(self) -> Result<Launcher> {
        let binary = resolve_binary(self.binary, env::var_os(BROWSER_PATH_ENV))?;
        self.options.validate()?;

        let scratch_root = self.scratch_root.unwrap_or_else(default_scratch_root);

        Ok(Launcher::from_config(LaunchConfig {
            binary,
            options: self.options,
            scratch_root,
            discovery: self.discovery,
            cleanup: self.cleanup,
            exit_grace: self.exit_grace,
            close_timeout: self.close_timeout,
            signals: self.signals,
        }))
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Resolves the browser binary: explicit path, then `from_env`, then `PATH`.
fn resolve_binary(explicit: Option<PathBuf>, from_env: Option<OsString>) -> Result<PathBuf> {
    if let Some(binary) = explicit {
        return validate_binary(binary);
    }

    if let Some(binary) = from_env.filter(|value| !value.is_empty()) {
        debug!(env = BROWSER_PATH_ENV, "Using browser from environment");
        return validate_binary(PathBuf::from(binary));
    }

    BINARY_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| {
            Error::config(format!(
                "No browser binary found. Use .binary() or set {BROWSER_PATH_ENV}.\n\
                 Searched PATH for: {}",
                BINARY_CANDIDATES.join(", ")
            ))
        })
}

fn validate_binary(binary: PathBuf) -> Result<PathBuf> {
    if binary.is_file() {
        return Ok(binary);
    }

    // Bare names are looked up on PATH.
    if binary.components().count() == 1
        && let Ok(found) = which::which(&binary)
    {
        return Ok(found);
    }

    Err(Error::browser_not_found(binary))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let builder = LauncherBuilder::new();
        assert!(builder.binary.is_none());
        assert_eq!(builder.discovery, RetryPolicy::discovery());
        assert_eq!(builder.cleanup, RetryPolicy::cleanup());
        assert_eq!(builder.signals, SignalConfig::default());
    }

    #[test]
    fn test_explicit_binary_must_exist() {
        let err = resolve_binary(Some(PathBuf::from("/nonexistent/chrome")), None).unwrap_err();
        assert!(matches!(err, Error::BrowserNotFound { .. }));
    }

    #[test]
    fn test_env_binary_is_used() {
        let dir = tempfile::tempdir().expect("dir");
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").expect("write");

        let binary = resolve_binary(None, Some(fake.clone().into_os_string())).expect("resolve");
        assert_eq!(binary, fake);
    }

    #[test]
    fn test_explicit_wins_over_env() {
        let dir = tempfile::tempdir().expect("dir");
        let explicit = dir.path().join("explicit");
        std::fs::write(&explicit, b"").expect("write");

        let binary = resolve_binary(
            Some(explicit.clone()),
            Some(OsString::from("/nonexistent/from-env")),
        )
        .expect("resolve");
        assert_eq!(binary, explicit);
    }

    #[test]
    fn test_env_binary_must_exist() {
        let err =
            resolve_binary(None, Some(OsString::from("/nonexistent/from-env"))).unwrap_err();
        assert!(matches!(err, Error::BrowserNotFound { .. }));
    }

    #[test]
    fn test_build_rejects_invalid_options() {
        let dir = tempfile::tempdir().expect("dir");
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").expect("write");

        let result = LauncherBuilder::new()
            .binary(&fake)
            .options(LaunchOptions::new().with_window_size(0, 0))
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_keeps_configuration() {
        let dir = tempfile::tempdir().expect("dir");
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").expect("write");

        let launcher = LauncherBuilder::new()
            .binary(&fake)
            .scratch_root(dir.path().join("scratch"))
            .options(LaunchOptions::new().with_port(9333))
            .build()
            .expect("build");

        assert_eq!(launcher.binary(), fake.as_path());
        assert_eq!(launcher.options().port, 9333);
        assert_eq!(launcher.scratch_root(), dir.path().join("scratch").as_path());
    }
}
