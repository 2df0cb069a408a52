//! Bounded retry of imagery requests

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Exponential backoff for transient failures.
///
/// Only errors for which [`MonitorError::is_transient`] holds are retried;
/// anything else is returned at once.
///
/// [`MonitorError::is_transient`]: crate::error::MonitorError::is_transient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.min(20);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut retry = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retry + 1 < attempts => {
                    let delay = self.delay(retry);
                    warn!(what, attempt = retry + 1, ?delay, error = %e, "transient failure, retrying");
                    std::thread::sleep(delay);
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use vegmon_cloud::CloudError;

    fn instant() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    fn unavailable() -> MonitorError {
        CloudError::Status {
            status: 503,
            url: "https://stac".into(),
        }
        .into()
    }

    #[test]
    fn delays_double_up_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        assert_eq!(policy.delay(10), Duration::from_millis(8000));
    }

    #[test]
    fn transient_errors_are_retried() {
        let mut calls = 0;
        let out = instant().run("search", || {
            calls += 1;
            if calls < 3 {
                Err(unavailable())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(out.unwrap(), 3);
    }

    #[test]
    fn attempts_are_bounded() {
        let mut calls = 0;
        let out: Result<()> = instant().run("search", || {
            calls += 1;
            Err(unavailable())
        });
        assert!(out.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_errors_fail_immediately() {
        let mut calls = 0;
        let out: Result<()> = instant().run("read", || {
            calls += 1;
            Err(MonitorError::MissingAsset {
                scene: "S2A".into(),
                band: "nir".into(),
            })
        });
        assert!(out.is_err());
        assert_eq!(calls, 1);
    }
}
