//! Check registration configuration

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::check::Check;
use crate::error::{HealthError, Result};

/// Whether a failing check flips the overall verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Critical,
    /// Reported in the payload but ignored by the verdict.
    Advisory,
}

/// Registration request for one check.
///
/// Defaults: no initial delay, run once, no timeout, [`Severity::Critical`].
/// A zero period means run once and a zero timeout means unbounded.
#[derive(Clone)]
pub struct CheckConfig {
    pub name: String,
    pub check: Option<Arc<dyn Check>>,
    pub initial_delay: Duration,
    pub execution_period: Option<Duration>,
    pub timeout: Option<Duration>,
    pub severity: Severity,
}

impl CheckConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: None,
            initial_delay: Duration::ZERO,
            execution_period: None,
            timeout: None,
            severity: Severity::Critical,
        }
    }

    pub fn check<C: Check + 'static>(mut self, check: C) -> Self {
        self.check = Some(Arc::new(check));
        self
    }

    pub fn shared_check(mut self, check: Arc<dyn Check>) -> Self {
        self.check = Some(check);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn execution_period(mut self, period: Duration) -> Self {
        self.execution_period = Some(period);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn advisory(self) -> Self {
        self.severity(Severity::Advisory)
    }

    /// Applies schedule values coming from a config file or the environment.
    /// Fields the settings leave unset keep their current value.
    pub fn with_settings(mut self, settings: &ScheduleSettings) -> Result<Self> {
        if let Some(delay) = settings.initial_delay_ms {
            self.initial_delay = millis("initial_delay_ms", delay)?;
        }
        if let Some(period) = settings.execution_period_ms {
            self.execution_period = Some(millis("execution_period_ms", period)?);
        }
        if let Some(timeout) = settings.timeout_ms {
            self.timeout = Some(millis("timeout_ms", timeout)?);
        }
        if let Some(severity) = settings.severity {
            self.severity = severity;
        }
        Ok(self)
    }

    pub(crate) fn into_entry(self) -> Result<CheckEntry> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(HealthError::InvalidConfig(
                "check name cannot be empty".to_string(),
            ));
        }

        let check = self.check.ok_or_else(|| {
            HealthError::InvalidConfig(format!("check '{}' has no probe attached", name))
        })?;

        Ok(CheckEntry {
            name,
            check,
            initial_delay: self.initial_delay,
            execution_period: self.execution_period.filter(|period| !period.is_zero()),
            timeout: self.timeout.filter(|timeout| !timeout.is_zero()),
            severity: self.severity,
        })
    }
}

impl std::fmt::Debug for CheckConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckConfig")
            .field("name", &self.name)
            .field("has_check", &self.check.is_some())
            .field("initial_delay", &self.initial_delay)
            .field("execution_period", &self.execution_period)
            .field("timeout", &self.timeout)
            .field("severity", &self.severity)
            .finish()
    }
}

fn millis(field: &str, value: i64) -> Result<Duration> {
    u64::try_from(value)
        .map(Duration::from_millis)
        .map_err(|_| HealthError::InvalidConfig(format!("{} cannot be negative (got {})", field, value)))
}

/// Declarative schedule overrides for a named check. Signed so bad input reaches
/// validation; `None` leaves the value set in code alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ScheduleSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_period_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl ScheduleSettings {
    pub fn has_negative_value(&self) -> bool {
        [self.initial_delay_ms, self.execution_period_ms, self.timeout_ms]
            .into_iter()
            .flatten()
            .any(|value| value < 0)
    }
}

/// A validated, immutable registration.
pub struct CheckEntry {
    pub name: String,
    pub check: Arc<dyn Check>,
    pub initial_delay: Duration,
    pub execution_period: Option<Duration>,
    pub timeout: Option<Duration>,
    pub severity: Severity,
}

impl CheckEntry {
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    pub fn runs_once(&self) -> bool {
        self.execution_period.is_none()
    }
}

impl std::fmt::Debug for CheckEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckEntry")
            .field("name", &self.name)
            .field("initial_delay", &self.initial_delay)
            .field("execution_period", &self.execution_period)
            .field("timeout", &self.timeout)
            .field("severity", &self.severity)
            .finish()
    }
}
