//! Execution deadline
//!
//! The gatekeeper cannot abort the engine. Instead it hands the executor a
//! [`QueryTimeout`]: an optional deadline that a cooperative executor checks
//! between stages and uses to bound its own I/O (see
//! [`QueryTimeout::remaining`]).

use std::time::{Duration, Instant};

/// Timeout error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Query exceeded timeout of {timeout:?} (ran for {elapsed:?})")]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub timeout: Duration,
    /// How long the query actually ran
    pub elapsed: Duration,
}

/// Deadline for one execution.
#[derive(Clone, Debug)]
pub struct QueryTimeout {
    start_time: Instant,
    timeout_duration: Option<Duration>,
}

impl QueryTimeout {
    pub fn new(timeout: Option<Duration>) -> Self {
        QueryTimeout {
            start_time: Instant::now(),
            timeout_duration: timeout,
        }
    }

    /// Build from a millisecond setting where 0 means unbounded.
    pub fn from_millis(timeout_ms: u64) -> Self {
        QueryTimeout::new((timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)))
    }

    pub fn infinite() -> Self {
        QueryTimeout::new(None)
    }

    /// Returns `Err` once the deadline has passed.
    pub fn check(&self) -> Result<(), TimeoutError> {
        if let Some(timeout) = self.timeout_duration {
            let elapsed = self.start_time.elapsed();
            if elapsed > timeout {
                return Err(TimeoutError { timeout, elapsed });
            }
        }
        Ok(())
    }

    /// The error an executor should report when it gives up on the deadline.
    pub fn error(&self) -> TimeoutError {
        TimeoutError {
            timeout: self.timeout_duration.unwrap_or(Duration::ZERO),
            elapsed: self.start_time.elapsed(),
        }
    }

    /// Time left before the deadline (`None` when unbounded).
    pub fn remaining(&self) -> Option<Duration> {
        self.timeout_duration
            .map(|timeout| timeout.saturating_sub(self.start_time.elapsed()))
    }
}

impl Default for QueryTimeout {
    fn default() -> Self {
        QueryTimeout::infinite()
    }
}
