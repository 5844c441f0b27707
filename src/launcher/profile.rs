//! Browser profile directories.
//!
//! A launch either runs on a caller-owned profile directory, which is never
//! touched on teardown, or on a temporary one created under a per-tool
//! scratch root, which teardown removes.
//!
//! The browser may hold files in the profile for a short while after it
//! exits, so removal retries under a [`RetryPolicy`].

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::fs;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Prefix of temporary profile directory names.
const TEMP_PREFIX: &str = "profile-";

// ============================================================================
// Profile
// ============================================================================

/// A browser profile directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Path to the profile directory.
    path: PathBuf,

    /// Created by the launcher and removed on teardown.
    temporary: bool,
}

// ============================================================================
// Profile - Constructors
// ============================================================================

impl Profile {
    /// Creates a temporary profile under `root`, creating `root` if needed.
    ///
    /// The directory is not removed on drop; teardown removes it with
    /// [`Profile::remove`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] if the directory cannot be created.
    pub fn new_temp_in(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| {
            Error::profile(format!(
                "Failed to create scratch root {}: {e}",
                root.display()
            ))
        })?;

        let path = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(root)
            .map_err(|e| Error::profile(format!("Failed to create temp profile: {e}")))?
            .keep();

        debug!(path = %path.display(), "Created temporary profile");

        Ok(Self {
            path,
            temporary: true,
        })
    }

    /// Uses an existing profile directory.
    ///
    /// If the directory doesn't exist, it is created. It is never removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] if the directory cannot be created.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        fs::create_dir_all(&path).map_err(|e| {
            Error::profile(format!(
                "Failed to create profile directory {}: {e}",
                path.display()
            ))
        })?;

        debug!(path = %path.display(), "Using existing profile");

        Ok(Self {
            path,
            temporary: false,
        })
    }
}

// ============================================================================
// Profile - Accessors
// ============================================================================

impl Profile {
    /// Returns the path to the profile directory.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if teardown removes this profile.
    #[inline]
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

// ============================================================================
// Profile - Removal
// ============================================================================

impl Profile {
    /// Removes a temporary profile, retrying under `policy`.
    ///
    /// A caller-owned profile, or one already gone, is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cleanup`] once the attempts are exhausted.
    pub async fn remove(&self, policy: &RetryPolicy) -> Result<()> {
        if !self.temporary {
            return Ok(());
        }

        policy
            .run(|_| {
                let path = self.path.clone();
                async move {
                    tokio::task::spawn_blocking(move || remove_dir(&path))
                        .await
                        .map_err(IoError::other)?
                }
            })
            .await
            .map_err(|exhausted| {
                Error::cleanup(&self.path, exhausted.attempts, exhausted.last_error)
            })?;

        info!(path = %self.path.display(), "Removed temporary profile");
        Ok(())
    }

    /// Blocking form of [`Profile::remove`], for drop paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cleanup`] once the attempts are exhausted.
    pub fn remove_blocking(&self, policy: &RetryPolicy) -> Result<()> {
        if !self.temporary {
            return Ok(());
        }

        policy
            .run_blocking(|_| remove_dir(&self.path))
            .map_err(|exhausted| {
                Error::cleanup(&self.path, exhausted.attempts, exhausted.last_error)
            })?;

        debug!(path = %self.path.display(), "Removed temporary profile");
        Ok(())
    }
}

/// Removes a directory tree; a missing tree counts as removed.
fn remove_dir(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

// ============================================================================
// Scratch Root
// ============================================================================

/// Default root for temporary profiles: `~/.cdp-driver/temp-profiles`, or
/// the system temp directory when there is no home directory.
#[must_use]
pub fn default_scratch_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".cdp-driver").join("temp-profiles"))
        .unwrap_or_else(|| env::temp_dir().join("cdp-driver-profiles"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_new_temp_in_creates_directory() {
        let root = tempfile::tempdir().expect("root");
        let profile = Profile::new_temp_in(&root.path().join("scratch")).expect("profile");

        assert!(profile.path().is_dir());
        assert!(profile.is_temporary());
        assert!(profile.path().starts_with(root.path()));

        let name = profile.path().file_name().expect("name").to_string_lossy();
        assert!(name.starts_with(TEMP_PREFIX));
    }

    #[test]
    fn test_temp_profiles_are_unique() {
        let root = tempfile::tempdir().expect("root");
        let a = Profile::new_temp_in(root.path()).expect("a");
        let b = Profile::new_temp_in(root.path()).expect("b");
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_from_path_creates_missing_directory() {
        let root = tempfile::tempdir().expect("root");
        let path = root.path().join("mine");

        let profile = Profile::from_path(&path).expect("profile");
        assert!(path.is_dir());
        assert!(!profile.is_temporary());
    }

    #[tokio::test]
    async fn test_remove_deletes_temp_profile() {
        let root = tempfile::tempdir().expect("root");
        let profile = Profile::new_temp_in(root.path()).expect("profile");
        fs::write(profile.path().join("Local State"), b"{}").expect("write");

        profile.remove(&RetryPolicy::cleanup()).await.expect("remove");
        assert!(!profile.path().exists());

        // Already gone counts as removed.
        profile.remove(&RetryPolicy::cleanup()).await.expect("remove again");
    }

    #[tokio::test]
    async fn test_remove_never_touches_caller_profile() {
        let root = tempfile::tempdir().expect("root");
        let profile = Profile::from_path(root.path().join("mine")).expect("profile");

        profile.remove(&RetryPolicy::cleanup()).await.expect("remove");
        profile.remove_blocking(&RetryPolicy::cleanup()).expect("remove");
        assert!(profile.path().is_dir());
    }

    #[test]
    fn test_remove_blocking_deletes_temp_profile() {
        let root = tempfile::tempdir().expect("root");
        let profile = Profile::new_temp_in(root.path()).expect("profile");
        fs::create_dir_all(profile.path().join("Default/Cache")).expect("mkdir");

        profile
            .remove_blocking(&RetryPolicy::new(3, Duration::from_millis(1)))
            .expect("remove");
        assert!(!profile.path().exists());
    }

    #[test]
    fn test_default_scratch_root() {
        let root = default_scratch_root();
        assert!(root.ends_with("temp-profiles") || root.ends_with("cdp-driver-profiles"));
    }
}
