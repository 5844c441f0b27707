//! Browser process guard.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::Result;

// ============================================================================
// ProcessGuard
// ============================================================================

/// Guards a child process and ensures it is killed when dropped.
#[derive(Debug)]
pub struct ProcessGuard {
    /// The child process handle, `None` once reaped.
    child: Option<Child>,
    /// Process ID for logging.
    pid: u32,
}

impl ProcessGuard {
    /// Creates a new process guard.
    #[must_use]
    pub fn new(child: Child) -> Self {
        let pid = child.id().unwrap_or(0);
        debug!(pid, "Process guard created");
        Self {
            child: Some(child),
            pid,
        }
    }

    /// Returns the process ID.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns `true` while the process has not exited.
    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Kills the process and waits for it to exit.
    ///
    /// An already exited process is only reaped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the process cannot be
    /// reaped.
    pub async fn kill(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid = self.pid, ?status, "Process already exited");
            return Ok(());
        }

        debug!(pid = self.pid, "Killing browser process");
        if let Err(e) = child.start_kill() {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal");
        }

        let status = child.wait().await?;
        info!(pid = self.pid, ?status, "Process terminated");
        Ok(())
    }

    /// Waits up to `grace` for the process to exit on its own, then kills
    /// it.
    ///
    /// # Errors
    ///
    /// As [`ProcessGuard::kill`].
    pub async fn wait_or_kill(&mut self, grace: Duration) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };

        let outcome = timeout(grace, child.wait()).await;

        match outcome {
            Ok(Ok(status)) => {
                info!(pid = self.pid, ?status, "Process exited");
                self.child = None;
                Ok(())
            }
            Ok(Err(e)) => {
                debug!(pid = self.pid, error = %e, "Failed to wait for process");
                self.kill().await
            }
            Err(_) => {
                debug!(pid = self.pid, grace_ms = grace.as_millis() as u64, "Process outlived grace period");
                self.kill().await
            }
        }
    }

    /// Sends the kill signal without waiting. For synchronous drop paths.
    pub fn start_kill(&mut self) {
        if let Some(child) = self.child.as_mut()
            && let Err(e) = child.start_kill()
        {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal");
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.start_kill()
        {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal in Drop");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::process::Stdio;

    use tokio::process::Command;

    fn spawn(program: &str, args: &[&str]) -> ProcessGuard {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn");
        ProcessGuard::new(child)
    }

    #[tokio::test]
    async fn test_kill_running_process() {
        let mut guard = spawn("sleep", &["30"]);
        assert!(guard.pid() > 0);
        assert!(guard.is_alive());

        guard.kill().await.expect("kill");
        assert!(!guard.is_alive());

        // Second kill is a no-op.
        guard.kill().await.expect("kill again");
    }

    #[tokio::test]
    async fn test_wait_or_kill_lets_process_exit() {
        let mut guard = spawn("true", &[]);
        guard
            .wait_or_kill(Duration::from_secs(5))
            .await
            .expect("wait");
        assert!(!guard.is_alive());
    }

    #[tokio::test]
    async fn test_wait_or_kill_kills_after_grace() {
        let mut guard = spawn("sleep", &["30"]);
        let started = std::time::Instant::now();

        guard
            .wait_or_kill(Duration::from_millis(50))
            .await
            .expect("wait");

        assert!(!guard.is_alive());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
