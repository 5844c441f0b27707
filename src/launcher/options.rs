//! Browser command-line options.
//!
//! Provides a type-safe interface for the browser's argument surface:
//! baseline automation flags, the debugging port, headless mode, the
//! profile directory, and caller-supplied arguments.
//!
//! # Example
//!
//! ```ignore
//! use cdp_driver::LaunchOptions;
//!
//! let options = LaunchOptions::new()
//!     .with_port(9333)
//!     .with_window_size(1920, 1080)
//!     .with_arg("https://example.com");
//!
//! let args = options.to_args(Some(Path::new("/tmp/profile")));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default remote debugging port.
pub const DEFAULT_PORT: u16 = 9222;

/// Page opened when the caller supplies none.
pub const BLANK_PAGE: &str = "about:blank";

/// Baseline flags for a quiet, automation-friendly browser.
pub const DEFAULT_ARGS: &[&str] = &[
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-client-side-phishing-detection",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-hang-monitor",
    "--disable-prompt-on-repost",
    "--disable-sync",
    "--disable-translate",
    "--metrics-recording-only",
    "--no-first-run",
    "--safebrowsing-disable-auto-update",
    "--password-store=basic",
    "--disable-features=site-per-process",
    "--use-mock-keychain",
    "--mute-audio",
    "--disable-domain-reliability",
    "--disable-renderer-backgrounding",
    "--disable-infobars",
];

const USER_DATA_DIR_FLAG: &str = "--user-data-dir";

// ============================================================================
// LaunchOptions
// ============================================================================

/// Browser process configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Run without a GUI. Enabled by default.
    pub headless: bool,

    /// Remote debugging port.
    pub port: u16,

    /// Discovery base URL. Defaults to `http://localhost:<port>`.
    pub discovery_url: Option<String>,

    /// Skip the baseline flags and the debugging port flag.
    pub ignore_default_args: bool,

    /// Profile directory to use instead of a temporary one. Never deleted.
    pub user_data_dir: Option<PathBuf>,

    /// Window dimensions in pixels (width, height).
    pub window_size: Option<(u32, u32)>,

    /// Additional arguments, placed before the generated ones.
    pub args: Vec<String>,

    /// Extra environment variables for the browser process.
    pub envs: Vec<(OsString, OsString)>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl LaunchOptions {
    /// Creates options with default settings: headless, port 9222.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            headless: true,
            port: DEFAULT_PORT,
            discovery_url: None,
            ignore_default_args: false,
            user_data_dir: None,
            window_size: None,
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Creates options for a visible browser window.
    #[inline]
    #[must_use]
    pub fn headed() -> Self {
        Self {
            headless: false,
            ..Self::new()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl LaunchOptions {
    /// Enables or disables headless mode.
    #[inline]
    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Sets the remote debugging port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the discovery base URL.
    #[inline]
    #[must_use]
    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = Some(url.into());
        self
    }

    /// Skips the baseline flags and the debugging port flag.
    #[inline]
    #[must_use]
    pub fn with_ignore_default_args(mut self) -> Self {
        self.ignore_default_args = true;
        self
    }

    /// Uses a caller-owned profile directory.
    #[inline]
    #[must_use]
    pub fn with_user_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(path.into());
        self
    }

    /// Sets window size in pixels.
    #[inline]
    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = Some((width, height));
        self
    }

    /// Adds a custom command-line argument.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple custom command-line arguments.
    #[inline]
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the browser process.
    #[inline]
    #[must_use]
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl LaunchOptions {
    /// Converts options to command-line arguments.
    ///
    /// `profile_dir` is passed as `--user-data-dir` unless the caller's args
    /// already carry that flag.
    #[must_use]
    pub fn to_args(&self, profile_dir: Option<&Path>) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + DEFAULT_ARGS.len() + 5);
        args.extend(self.args.iter().cloned());

        if !self.ignore_default_args {
            args.extend(DEFAULT_ARGS.iter().map(ToString::to_string));
            args.push(format!("--remote-debugging-port={}", self.port));
        }

        if self.headless {
            args.push("--headless".to_string());
        }

        if let Some((width, height)) = self.window_size {
            args.push(format!("--window-size={width},{height}"));
        }

        if !self.supplies_user_data_dir()
            && let Some(dir) = profile_dir
        {
            args.push(format!("{USER_DATA_DIR_FLAG}={}", dir.display()));
        }

        if !self.supplies_starting_page() {
            args.push(BLANK_PAGE.to_string());
        }

        args
    }

    /// Returns the discovery base URL.
    #[must_use]
    pub fn discovery_url(&self) -> String {
        self.discovery_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }

    /// Returns `true` if the caller's args carry `--user-data-dir`.
    #[must_use]
    pub fn supplies_user_data_dir(&self) -> bool {
        self.args
            .iter()
            .any(|arg| arg.starts_with(USER_DATA_DIR_FLAG))
    }

    /// Returns `true` if the caller's args carry a positional argument.
    #[must_use]
    pub fn supplies_starting_page(&self) -> bool {
        self.args.iter().any(|arg| !arg.starts_with('-'))
    }

    /// Returns `true` if a profile directory must be resolved by the
    /// launcher, as opposed to one passed through the caller's args.
    #[inline]
    #[must_use]
    pub fn needs_profile(&self) -> bool {
        !self.supplies_user_data_dir()
    }

    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if validation fails.
    pub fn validate(&self) -> Result<()> {
        if let Some((width, height)) = self.window_size
            && (width == 0 || height == 0)
        {
            return Err(Error::config("Window dimensions must be greater than zero"));
        }

        if self.port == 0 && self.discovery_url.is_none() {
            return Err(Error::config(
                "Port 0 needs an explicit discovery URL to find the browser",
            ));
        }

        if let Some(url) = &self.discovery_url {
            let parsed = url::Url::parse(url)
                .map_err(|e| Error::config(format!("Invalid discovery URL {url}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::config(format!(
                    "Discovery URL {url} must be http or https"
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
