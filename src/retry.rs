//! Retry policy for transient failures
//!
//! Network-facing operations (fetching, updating a working copy, downloading
//! an archive) occasionally fail for reasons that go away on their own. The
//! [`RetryPolicy`] runs such an operation again a bounded number of times.
//! Only errors for which [`Error::is_retryable`] holds are retried: a working
//! copy with the wrong origin stays wrong no matter how often it is updated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, Result};

/// How often, and how patiently, to retry a failing operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Pause between two attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// One retry after a short pause.
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// A policy allowing `retries` additional attempts.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts. The closure receives the attempt number,
    /// starting at 1.
    ///
    /// When `cancel` is set before an attempt starts, the operation is not
    /// attempted again and `Error::Interrupted` is returned.
    pub fn execute<T, F>(&self, operation_name: &str, cancel: Option<&AtomicBool>, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if cancel.is_some_and(|flag| flag.load(Ordering::Acquire)) {
                return Err(Error::Interrupted);
            }

            match operation(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            "'{}' succeeded after {} attempts",
                            operation_name, attempt
                        );
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => {
                    debug!("'{}' failed with a non-retryable error: {}", operation_name, error);
                    return Err(error);
                }
                Err(error) if attempt >= max_attempts => {
                    if max_attempts > 1 {
                        warn!(
                            "'{}' still failing after {} attempts",
                            operation_name, attempt
                        );
                    }
                    return Err(error);
                }
                Err(error) => {
                    warn!(
                        "'{}' failed (attempt {}/{}), retrying: {}",
                        operation_name, attempt, max_attempts, error
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
