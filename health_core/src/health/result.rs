use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
    TimedOut,
    /// Registered but not completed yet.
    #[serde(rename = "pending")]
    Pending,
}

impl CheckStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckStatus::Unhealthy | CheckStatus::TimedOut)
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Healthy => write!(f, "Healthy"),
            CheckStatus::Unhealthy => write!(f, "Unhealthy"),
            CheckStatus::TimedOut => write!(f, "TimedOut"),
            CheckStatus::Pending => write!(f, "pending"),
        }
    }
}

/// Outcome of one execution. Never mutated once built; a newer result replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub details: Option<Value>,
    /// Present iff the status is a failure.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub contiguous_failures: u64,
    pub time_of_first_failure: Option<DateTime<Utc>>,
}

impl CheckResult {
    pub fn pending() -> Self {
        Self::build(CheckStatus::Pending, None, None, Duration::ZERO)
    }

    pub fn healthy(details: Option<Value>, duration: Duration) -> Self {
        Self::build(CheckStatus::Healthy, details, None, duration)
    }

    pub fn unhealthy(error: String, details: Option<Value>, duration: Duration) -> Self {
        Self::build(CheckStatus::Unhealthy, details, Some(error), duration)
    }

    pub fn timed_out(timeout: Duration, duration: Duration) -> Self {
        Self::build(
            CheckStatus::TimedOut,
            None,
            Some(format!("check timed out after {}ms", timeout.as_millis())),
            duration,
        )
    }

    fn build(
        status: CheckStatus,
        details: Option<Value>,
        error: Option<String>,
        duration: Duration,
    ) -> Self {
        Self {
            status,
            details,
            error,
            timestamp: Utc::now(),
            duration,
            contiguous_failures: 0,
            time_of_first_failure: None,
        }
    }

    /// Carries the failure streak over from the result this one replaces.
    pub fn following(mut self, previous: Option<&CheckResult>) -> Self {
        if self.status.is_failure() {
            match previous.filter(|prev| prev.status.is_failure()) {
                Some(prev) => {
                    self.contiguous_failures = prev.contiguous_failures + 1;
                    self.time_of_first_failure = prev.time_of_first_failure.or(Some(prev.timestamp));
                }
                None => {
                    self.contiguous_failures = 1;
                    self.time_of_first_failure = Some(self.timestamp);
                }
            }
        } else {
            self.contiguous_failures = 0;
            self.time_of_first_failure = None;
        }
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == CheckStatus::Healthy
    }

    pub fn is_pending(&self) -> bool {
        self.status == CheckStatus::Pending
    }
}
