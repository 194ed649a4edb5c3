use crate::schemas::errors::InstallError;
use std::time::{Duration, Instant};

/// Upper bound on a long-running step (download, extraction, waiting for an answer).
#[derive(Debug, Clone)]
pub struct Deadline {
    during: String,
    limit: Duration,
    started: Instant,
}

impl Deadline {
    /// Starts the clock for `during` (a short description used in the timeout message).
    pub fn start(during: impl Into<String>, limit: Duration) -> Self {
        Deadline {
            during: during.into(),
            limit,
            started: Instant::now(),
        }
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    /// `Err(Timeout)` once the limit is reached.
    pub fn check(&self) -> Result<(), InstallError> {
        if self.expired() {
            Err(self.to_error())
        } else {
            Ok(())
        }
    }

    pub fn to_error(&self) -> InstallError {
        InstallError::Timeout {
            during: self.during.clone(),
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_expires_immediately() {
        let deadline = Deadline::start("downloading", Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.check().unwrap_err().kind(), "TimeoutError");
    }

    #[test]
    fn generous_limit_passes() {
        let deadline = Deadline::start("extracting", Duration::from_secs(3600));
        assert!(deadline.check().is_ok());
        assert!(deadline.remaining() > Duration::from_secs(3000));
    }
}
