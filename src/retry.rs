//! Upload failure classification and the bounded retry budget
//!
//! Every upload failure falls into one of three classes:
//! - [`FailureClass::SessionExpired`] - the resumable session is gone; open a new one
//! - [`FailureClass::TransientServer`] - resume the same session from its last acknowledged byte
//! - [`FailureClass::Fatal`] - record the error and fail the task
//!
//! Both retryable classes draw from the same [`RetryBudget`], which is created
//! once per task upload and never replenished.
//!
//! # Example
//!
//! ```
//! use transit_dl::error::UploadError;
//! use transit_dl::retry::{Classify, FailureClass, RetryBudget};
//!
//! let mut budget = RetryBudget::new(2);
//! let err = UploadError::from_status(503, "busy");
//! assert_eq!(err.failure_class(), FailureClass::TransientServer);
//! assert!(budget.try_consume());
//! assert!(budget.try_consume());
//! assert!(!budget.try_consume());
//! ```

use crate::config::RetryConfig;
use crate::error::UploadError;
use rand::Rng;
use std::time::Duration;

/// Retry class of an upload failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Recreate the upload session from scratch
    SessionExpired,
    /// Resume the current session
    TransientServer,
    /// Terminal
    Fatal,
}

impl FailureClass {
    /// Whether the class may consume a retry
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureClass::Fatal)
    }
}

/// Trait for errors that can be classified for the upload retry policy
pub trait Classify {
    /// Which retry class the failure belongs to
    fn failure_class(&self) -> FailureClass;
}

impl Classify for UploadError {
    fn failure_class(&self) -> FailureClass {
        match self {
            UploadError::SessionExpired { .. } => FailureClass::SessionExpired,
            UploadError::TransientServer { .. } => FailureClass::TransientServer,
            // Timeouts and dropped connections leave the server-side session intact
            UploadError::Network { retryable, .. } => {
                if *retryable {
                    FailureClass::TransientServer
                } else {
                    FailureClass::Fatal
                }
            }
            UploadError::Rejected { .. } => FailureClass::Fatal,
            UploadError::Protocol(_) => FailureClass::Fatal,
            UploadError::Io(_) => FailureClass::Fatal,
            UploadError::NotAuthorized(_) => FailureClass::Fatal,
            UploadError::RetriesExhausted { .. } => FailureClass::Fatal,
            UploadError::Aborted => FailureClass::Fatal,
        }
    }
}

/// Bounded retry counter for one task upload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    max: u32,
    remaining: u32,
}

impl RetryBudget {
    /// A fresh budget allowing `max` retries
    pub fn new(max: u32) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    /// Take one retry; `false` once the budget is spent
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    /// Retries consumed so far
    pub fn used(&self) -> u32 {
        self.max - self.remaining
    }

    /// Retries still available
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// The configured bound
    pub fn max(&self) -> u32 {
        self.max
    }
}

/// Delay before the `attempt`-th retry (1-based), exponential and capped
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    let delay = Duration::from_secs_f64(secs.min(config.max_delay.as_secs_f64()));
    if config.jitter && !delay.is_zero() {
        add_jitter(delay)
    } else {
        delay
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
