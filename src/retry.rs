//! Bounded fixed-interval retry.
//!
//! Used wherever the launcher waits on something outside its control: the
//! discovery endpoint coming up, and a profile directory becoming removable
//! after the browser released its files.
//!
//! Exhausting the attempts is a distinguishable outcome ([`Exhausted`]),
//! never a hang.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::thread;
use std::time::Duration;

use tracing::trace;

// ============================================================================
// RetryPolicy
// ============================================================================

/// How many times to try, and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least one attempt is made.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::discovery()
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[inline]
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Endpoint discovery: 100 attempts, 100 ms apart.
    #[inline]
    #[must_use]
    pub const fn discovery() -> Self {
        Self::new(100, Duration::from_millis(100))
    }

    /// Profile removal: 100 attempts, 20 ms apart.
    #[inline]
    #[must_use]
    pub const fn cleanup() -> Self {
        Self::new(100, Duration::from_millis(20))
    }

    /// Upper bound of the time spent sleeping between attempts.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval * self.attempts().saturating_sub(1)
    }

    #[inline]
    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Runs `operation` until it succeeds or the attempts are exhausted.
    ///
    /// The closure receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] carrying the last error.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    trace!(attempt, attempts, "Attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(Exhausted {
            attempts,
            last_error,
        })
    }

    /// Blocking form of [`RetryPolicy::run`], for drop paths.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] carrying the last error.
    pub fn run_blocking<T, E, F>(&self, mut operation: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
    {
        let attempts = self.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e),
            }

            if attempt < attempts {
                thread::sleep(self.interval);
            }
        }

        Err(Exhausted {
            attempts,
            last_error,
        })
    }
}

// ============================================================================
// Exhausted
// ============================================================================

/// Every attempt failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Attempts made.
    pub attempts: u32,
    /// Error of the last attempt.
    pub last_error: Option<E>,
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempts", self.attempts)?;
        if let Some(e) = &self.last_error {
            write!(f, ": {e}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
