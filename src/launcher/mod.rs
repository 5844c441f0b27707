//! Browser process lifecycle.
//!
//! Starts a browser with a debugging port, finds its page endpoint, connects
//! to it, and makes sure neither the process nor a temporary profile outlives
//! the owner.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Launcher`] | Starts browsers, or connects to running ones |
//! | [`LauncherBuilder`] | Fluent configuration builder |
//! | [`LaunchOptions`] | Browser command-line options |
//! | [`Browser`] | Handle owning process, profile and connection |
//! | [`Profile`] | Caller-owned or temporary profile directory |
//! | [`Discovery`] | `/json` endpoint client |
//! | [`SignalHooks`] | Teardown on termination signals |
//!
//! # Example
//!
//! ```no_run
//! use cdp_driver::{LaunchOptions, Launcher, Result};
//!
//! # async fn example() -> Result<()> {
//! let browser = Launcher::builder()
//!     .options(LaunchOptions::new().with_window_size(1280, 800))
//!     .build()?
//!     .launch()
//!     .await?;
//!
//! let session = browser.attach_first_page().await?;
//! session.send("Page.enable", serde_json::json!({})).await?;
//!
//! browser.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Browser handle and teardown.
pub mod browser;

/// Fluent builder for launcher configuration.
pub mod builder;

/// Launch phases.
pub mod core;

/// Discovery endpoint client.
pub mod discovery;

/// Browser command-line options.
pub mod options;

/// Process guard.
pub mod process;

/// Profile directories.
pub mod profile;

/// Termination signal hooks.
pub mod signals;

// ============================================================================
// Re-exports
// ============================================================================

pub use browser::{Browser, LaunchPhase};
pub use builder::{BROWSER_PATH_ENV, LauncherBuilder};
pub use core::{Launcher, connect};
pub use discovery::{BrowserVersion, Discovery, TargetDescriptor, select_page_endpoint};
pub use options::{BLANK_PAGE, DEFAULT_ARGS, DEFAULT_PORT, LaunchOptions};
pub use process::ProcessGuard;
pub use profile::{Profile, default_scratch_root};
pub use signals::{ExitSignal, SignalConfig, SignalHooks};
